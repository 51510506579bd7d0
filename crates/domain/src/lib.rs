//! Inventory ledger model.
//!
//! This crate provides the pure, storage-independent rules of the ledger:
//! - `StockLine`: one versioned counter per product option
//! - `StockHistory`: append-only record of every applied mutation
//! - `StockEventType`: why a mutation happened, and which sign it carries

pub mod error;
pub mod history;
pub mod stock;

pub use common::{HistoryId, OrderId, ProductId, StockId, VariantId};
pub use error::StockError;
pub use history::{StockEventType, StockHistory};
pub use stock::{StockLine, Version};
