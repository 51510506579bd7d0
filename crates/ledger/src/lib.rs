//! Inventory ledger storage.
//!
//! The ledger is the only shared mutable resource of the service. All
//! coordination between workers happens here: stock line writes are
//! rejected when the stored version moved on (`ConcurrencyConflict`), and
//! at most one outbound record may exist per (order, stock line)
//! (`DuplicateOrderLine`).

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use domain::{
    HistoryId, OrderId, ProductId, StockEventType, StockHistory, StockId, StockLine, VariantId,
    Version,
};
pub use error::{LedgerError, Result};
pub use memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use store::{ChangeSet, LineWrite, StockLedger, StockLedgerExt};
