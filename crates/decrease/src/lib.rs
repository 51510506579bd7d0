//! Stock decrease processing.
//!
//! A decrement request for one order flows through these pieces:
//! 1. [`StockDecreaseConsumer`] receives it from the main channel
//! 2. [`DecreaseOrchestrator`] applies every line atomically, or none
//! 3. On a retryable failure, [`RetryCoordinator`] republishes it to the
//!    delay channel or, once the budget is spent, dead-letters it
//! 4. On a terminal failure, [`FailureTranslator`] builds the compensating
//!    event the upstream order flow reacts to
//!
//! Whatever happens, the original delivery is acknowledged exactly once.

pub mod consumer;
pub mod error;
pub mod events;
pub mod order_created;
pub mod orchestrator;
pub mod publisher;
pub mod retry;
pub mod state;
pub mod translator;

pub use consumer::{ConsumerWorker, DeliveryHandler, StockDecreaseConsumer};
pub use error::{ConsumerError, DecreaseFailure, Result};
pub use events::{
    DecreaseLine, OrderCreatedEvent, OrderProcessFailedEvent, OrderedProduct,
    StockDecreaseBatchEvent, StockDecreaseSuccessEvent,
};
pub use orchestrator::{DecreaseOrchestrator, DecreaseOutcome};
pub use order_created::{OrderCreatedTranslator, TranslationOutcome};
pub use publisher::{BrokerEventPublisher, InMemoryEventPublisher, StockEventPublisher};
pub use retry::{DEFAULT_RETRY_MAX, RetryCoordinator, RetryPolicy};
pub use state::{DeliveryOutcome, DeliveryState};
pub use translator::{FailureTranslator, ORDER_CREATED_EVENT_PROCESS_FAILED};
