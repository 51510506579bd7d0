//! Message broker seam.
//!
//! Messages travel between three logical channels:
//! - the main decrement channel, consumed by workers
//! - a delay channel with a fixed TTL that dead-letters back into the main
//!   channel on expiry (the only backoff mechanism)
//! - a terminal dead-letter channel that is never redelivered
//!
//! Retry bookkeeping rides along as message headers (`x-retry-count`,
//! `x-error-type`).

pub mod broker;
pub mod channels;
pub mod error;
pub mod memory;
pub mod message;
pub mod postgres;

pub use broker::MessageBroker;
pub use channels::{Channels, DelayQueue};
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use message::{
    Delivery, ERROR_TYPE_HEADER, Message, MessageHeaders, RETRY_COUNT_HEADER, StockErrorType,
};
pub use postgres::PostgresBroker;
