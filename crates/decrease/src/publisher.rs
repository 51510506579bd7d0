//! Outward event publishing.

use std::sync::Arc;

use async_trait::async_trait;
use messaging::{BrokerError, Message, MessageBroker};
use tokio::sync::Mutex;

use crate::events::{OrderProcessFailedEvent, StockDecreaseSuccessEvent};

/// Publishes the events the order service reacts to.
#[async_trait]
pub trait StockEventPublisher: Send + Sync {
    /// Announces that every line of an order was decremented.
    async fn publish_success(&self, event: StockDecreaseSuccessEvent) -> messaging::Result<()>;

    /// Announces that an order cannot be fulfilled.
    async fn publish_failure(&self, event: OrderProcessFailedEvent) -> messaging::Result<()>;
}

/// Publishes events as JSON messages on broker queues.
#[derive(Debug, Clone)]
pub struct BrokerEventPublisher<B> {
    broker: B,
    success_queue: String,
    failure_queue: String,
}

impl<B: MessageBroker> BrokerEventPublisher<B> {
    pub fn new(
        broker: B,
        success_queue: impl Into<String>,
        failure_queue: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            success_queue: success_queue.into(),
            failure_queue: failure_queue.into(),
        }
    }
}

#[async_trait]
impl<B: MessageBroker> StockEventPublisher for BrokerEventPublisher<B> {
    async fn publish_success(&self, event: StockDecreaseSuccessEvent) -> messaging::Result<()> {
        self.broker
            .publish(&self.success_queue, Message::json(&event)?)
            .await
    }

    async fn publish_failure(&self, event: OrderProcessFailedEvent) -> messaging::Result<()> {
        self.broker
            .publish(&self.failure_queue, Message::json(&event)?)
            .await
    }
}

#[derive(Debug, Default)]
struct PublishedEvents {
    successes: Vec<StockDecreaseSuccessEvent>,
    failures: Vec<OrderProcessFailedEvent>,
    fail_publish: bool,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    state: Arc<Mutex<PublishedEvents>>,
}

impl InMemoryEventPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail.
    pub async fn set_fail_publish(&self, fail: bool) {
        self.state.lock().await.fail_publish = fail;
    }

    /// Returns the success events published so far.
    pub async fn successes(&self) -> Vec<StockDecreaseSuccessEvent> {
        self.state.lock().await.successes.clone()
    }

    /// Returns the failure events published so far.
    pub async fn failures(&self) -> Vec<OrderProcessFailedEvent> {
        self.state.lock().await.failures.clone()
    }
}

#[async_trait]
impl StockEventPublisher for InMemoryEventPublisher {
    async fn publish_success(&self, event: StockDecreaseSuccessEvent) -> messaging::Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_publish {
            return Err(BrokerError::Unavailable("publisher disabled".to_string()));
        }
        state.successes.push(event);
        Ok(())
    }

    async fn publish_failure(&self, event: OrderProcessFailedEvent) -> messaging::Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_publish {
            return Err(BrokerError::Unavailable("publisher disabled".to_string()));
        }
        state.failures.push(event);
        Ok(())
    }
}
