//! Shared identifier types.

mod types;

pub use types::{HistoryId, OrderId, ProductId, StockId, VariantId};
