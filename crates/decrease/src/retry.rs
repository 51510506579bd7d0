//! Retry/dead-letter routing.

use messaging::{Channels, Message, MessageBroker, StockErrorType};

/// Default number of retries before a transient failure is dead-lettered.
pub const DEFAULT_RETRY_MAX: u32 = 5;

/// How many times a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Returns the retry count for the next attempt, or `None` once the
    /// budget is spent.
    pub fn next_retry(&self, retry_count: u32) -> Option<u32> {
        let next = retry_count.saturating_add(1);
        (next <= self.max_retries).then_some(next)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_MAX)
    }
}

/// Republishes failed payloads to the delay channel or the dead-letter
/// channel.
///
/// Neither channel is acknowledged here; the consumer acks the original
/// delivery once routing succeeded.
#[derive(Debug, Clone)]
pub struct RetryCoordinator<B> {
    broker: B,
    channels: Channels,
    policy: RetryPolicy,
}

impl<B: MessageBroker> RetryCoordinator<B> {
    /// Creates a new coordinator.
    pub fn new(broker: B, channels: Channels, policy: RetryPolicy) -> Self {
        Self {
            broker,
            channels,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Parks the payload on the delay channel with `retry_count + 1`.
    ///
    /// Once the channel's TTL expires the broker moves it back onto the main
    /// channel. Returns the retry count the copy carries.
    #[tracing::instrument(skip(self, payload))]
    pub async fn schedule_retry(
        &self,
        payload: serde_json::Value,
        retry_count: u32,
    ) -> messaging::Result<u32> {
        let next = retry_count.saturating_add(1);
        let message = Message::new(payload).with_retry_count(next);

        self.broker
            .publish(&self.channels.decrease_retry, message)
            .await?;

        metrics::counter!("stock_decrease_retried_total").increment(1);
        tracing::info!(next_retry = next, "retry scheduled");
        Ok(next)
    }

    /// Publishes the payload to the terminal dead-letter channel.
    ///
    /// The copy carries `retry_count` unchanged and `reason` as its error
    /// type.
    #[tracing::instrument(skip(self, payload))]
    pub async fn dead_letter(
        &self,
        payload: serde_json::Value,
        retry_count: u32,
        reason: StockErrorType,
    ) -> messaging::Result<()> {
        let message = Message::new(payload)
            .with_retry_count(retry_count)
            .with_error_type(reason);

        self.broker
            .publish(&self.channels.decrease_dead, message)
            .await?;

        metrics::counter!("stock_decrease_dead_lettered_total", "error_type" => reason.as_str())
            .increment(1);
        tracing::warn!("dead-lettered");
        Ok(())
    }
}
