use domain::{OrderId, StockError, StockId, VariantId, Version};
use thiserror::Error;

/// Errors that can occur when reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A stock line write targeted a stale version.
    #[error(
        "Concurrency conflict on stock line {stock_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        stock_id: StockId,
        expected: Version,
        actual: Version,
    },

    /// An outbound record for this (order, stock line) already exists.
    #[error("Order {order_id} already has a record for stock line {stock_id}")]
    DuplicateOrderLine { order_id: OrderId, stock_id: StockId },

    /// No stock line is registered for the option.
    #[error("No stock line registered for option {0}")]
    StockNotFound(VariantId),

    /// A write referenced a stock line id the ledger does not know.
    #[error("Unknown stock line: {0}")]
    UnknownStockLine(StockId),

    /// A stock line is already registered for the option.
    #[error("Stock line already registered for option {0}")]
    AlreadyRegistered(VariantId),

    /// The change set is not internally consistent.
    #[error("Invalid change set: {0}")]
    InvalidChangeSet(String),

    /// A ledger rule rejected the change.
    #[error("Stock rule violated: {0}")]
    Domain(#[from] StockError),

    /// A stored row could not be mapped back to the model.
    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// Returns true if a fresh read and retry may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
