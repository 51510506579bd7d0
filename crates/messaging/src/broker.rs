use async_trait::async_trait;

use crate::{Delivery, Message, Result};

/// Core trait for broker implementations.
///
/// Delivery is at-least-once: a delivery that is neither acknowledged nor
/// requeued (the worker crashed) is handed out again later.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes a message to a queue.
    ///
    /// Publishing to a delay queue parks the message until its TTL expires,
    /// after which it moves to the delay queue's dead-letter target.
    async fn publish(&self, queue: &str, message: Message) -> Result<()>;

    /// Takes the next visible message from a queue, if any.
    ///
    /// Delay queues are never consumed directly and always return `None`.
    async fn receive(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Positively acknowledges a delivery, removing it for good.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Hands an unacknowledged delivery back to its queue.
    async fn requeue(&self, delivery: &Delivery) -> Result<()>;
}
