//! Channel names and delay topology.

use std::time::Duration;

/// A queue whose messages expire after a fixed TTL into another queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayQueue {
    pub name: String,
    pub ttl: Duration,
    pub dead_letter_to: String,
}

/// Logical channels used by the stock decrease flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    /// Main decrement channel.
    pub decrease: String,
    /// Delayed retry channel; expires back into `decrease`.
    pub decrease_retry: String,
    /// Fixed delay before a retried message is redelivered.
    pub retry_ttl: Duration,
    /// Terminal dead-letter channel.
    pub decrease_dead: String,
    /// Outward success notifications.
    pub decrease_success: String,
    /// Upstream order-created events.
    pub order_created: String,
    /// Outward compensating failure events.
    pub order_process_failed: String,
}

impl Channels {
    /// Returns the delay declaration of the retry channel.
    pub fn retry_queue(&self) -> DelayQueue {
        DelayQueue {
            name: self.decrease_retry.clone(),
            ttl: self.retry_ttl,
            dead_letter_to: self.decrease.clone(),
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            decrease: "stock.decrease".to_string(),
            decrease_retry: "stock.decrease.retry".to_string(),
            retry_ttl: Duration::from_secs(5),
            decrease_dead: "stock.decrease.dead".to_string(),
            decrease_success: "stock.decrease.success".to_string(),
            order_created: "order.created".to_string(),
            order_process_failed: "order.process.failed".to_string(),
        }
    }
}
