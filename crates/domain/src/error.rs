//! Domain error types.

use common::{StockId, VariantId};
use thiserror::Error;

use crate::history::StockEventType;

/// Errors raised by ledger rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// A line cannot be registered with an empty counter.
    #[error("Initial quantity must be at least 1, got {0}")]
    InvalidInitialQuantity(u32),

    /// Increase and decrease amounts must be strictly positive.
    #[error("Amount must be at least 1, got {0}")]
    InvalidAmount(u32),

    /// The requested decrement exceeds the remaining quantity.
    #[error(
        "Insufficient stock for line {stock_id} (option {variant_id}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        stock_id: StockId,
        variant_id: VariantId,
        available: u32,
        requested: u32,
    },

    /// An increase would overflow the counter.
    #[error("Quantity overflow on line {0}")]
    QuantityOverflow(StockId),

    /// History records must carry a non-zero delta.
    #[error("Changed quantity must not be zero")]
    ZeroChange,

    /// The sign of the delta does not match the event type.
    #[error("{event_type} does not accept a change of {changed}")]
    SignMismatch {
        event_type: StockEventType,
        changed: i64,
    },

    /// An unrecognised event type name was read from storage.
    #[error("Unknown stock event type: {0}")]
    UnknownEventType(String),
}
