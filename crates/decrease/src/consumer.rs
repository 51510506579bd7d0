//! Consumer state machine and polling worker.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use ledger::StockLedger;
use messaging::{Channels, Delivery, Message, MessageBroker, StockErrorType};
use tokio::sync::watch;

use crate::error::Result;
use crate::events::StockDecreaseBatchEvent;
use crate::orchestrator::DecreaseOrchestrator;
use crate::publisher::StockEventPublisher;
use crate::retry::{RetryCoordinator, RetryPolicy};
use crate::state::DeliveryOutcome;
use crate::translator::FailureTranslator;

/// Handles deliveries from one queue, acknowledging each exactly once.
///
/// An `Err` means the delivery was left unacknowledged.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    type Outcome: Debug + Send;

    /// Queue this handler consumes.
    fn queue(&self) -> &str;

    /// Routes and acknowledges one delivery.
    async fn handle(&self, delivery: &Delivery) -> Result<Self::Outcome>;
}

/// Consumes decrement requests from the main channel.
///
/// Every delivery ends in exactly one of three states, each of which acks
/// the original:
/// - `Succeeded`: the batch was applied (or had been already)
/// - `RetryScheduled`: a copy with `retry_count + 1` went to the delay channel
/// - `DeadLettered`: a copy went to the dead-letter channel and, when the
///   order is known, a compensating event was published
pub struct StockDecreaseConsumer<L, P, B>
where
    L: StockLedger,
    P: StockEventPublisher,
    B: MessageBroker,
{
    orchestrator: DecreaseOrchestrator<L, P>,
    retry: RetryCoordinator<B>,
    publisher: P,
    broker: B,
}

impl<L, P, B> StockDecreaseConsumer<L, P, B>
where
    L: StockLedger,
    P: StockEventPublisher + Clone,
    B: MessageBroker + Clone,
{
    /// Creates a new consumer.
    pub fn new(
        ledger: L,
        publisher: P,
        broker: B,
        channels: Channels,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            orchestrator: DecreaseOrchestrator::new(ledger, publisher.clone()),
            retry: RetryCoordinator::new(broker.clone(), channels, policy),
            publisher,
            broker,
        }
    }
}

impl<L, P, B> StockDecreaseConsumer<L, P, B>
where
    L: StockLedger,
    P: StockEventPublisher,
    B: MessageBroker,
{
    pub fn orchestrator(&self) -> &DecreaseOrchestrator<L, P> {
        &self.orchestrator
    }

    pub fn channels(&self) -> &Channels {
        self.retry.channels()
    }

    /// Processes one delivery and acknowledges it.
    #[tracing::instrument(
        skip(self, delivery),
        fields(tag = delivery.tag, retry = delivery.message.headers.retry_count())
    )]
    pub async fn handle(&self, delivery: &Delivery) -> Result<DeliveryOutcome> {
        metrics::counter!("stock_decrease_received_total").increment(1);
        tracing::debug!("received");

        let retry_count = delivery.message.headers.retry_count();
        let outcome = self.process(&delivery.message, retry_count).await?;

        self.broker.ack(delivery).await?;
        tracing::debug!(state = %outcome.state(), "acked");
        Ok(outcome)
    }

    async fn process(&self, message: &Message, retry_count: u32) -> Result<DeliveryOutcome> {
        let event: StockDecreaseBatchEvent = match message.decode() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable decrease request");
                let order_id = order_id_hint(&message.payload);
                return self
                    .dead_letter(message, order_id, retry_count, StockErrorType::UnknownError)
                    .await;
            }
        };
        let order_id = event.order_id;
        tracing::debug!(%order_id, lines = event.items.len(), "processing");

        let failure = match self.orchestrator.decrease_batch(order_id, &event.items).await {
            Ok(outcome) => {
                metrics::counter!("stock_decrease_succeeded_total").increment(1);
                tracing::info!(%order_id, ?outcome, "succeeded");
                return Ok(DeliveryOutcome::Succeeded);
            }
            Err(failure) => failure,
        };

        if !failure.is_retryable() {
            tracing::warn!(%order_id, error = %failure, "decrease rejected");
            return self
                .dead_letter(
                    message,
                    Some(order_id),
                    retry_count,
                    failure.dead_letter_type(),
                )
                .await;
        }

        if self.retry.policy().next_retry(retry_count).is_none() {
            tracing::error!(%order_id, error = %failure, "retries exhausted");
            return self
                .dead_letter(
                    message,
                    Some(order_id),
                    retry_count,
                    failure.dead_letter_type(),
                )
                .await;
        }

        tracing::warn!(%order_id, error = %failure, "decrease failed, will retry");
        let next = self
            .retry
            .schedule_retry(message.payload.clone(), retry_count)
            .await?;
        Ok(DeliveryOutcome::RetryScheduled { retry_count: next })
    }

    async fn dead_letter(
        &self,
        message: &Message,
        order_id: Option<OrderId>,
        retry_count: u32,
        error_type: StockErrorType,
    ) -> Result<DeliveryOutcome> {
        match order_id {
            Some(order_id) => {
                self.publisher
                    .publish_failure(FailureTranslator::for_error_type(order_id, error_type))
                    .await?;
            }
            None => tracing::warn!("no order id in payload, compensating event skipped"),
        }

        self.retry
            .dead_letter(message.payload.clone(), retry_count, error_type)
            .await?;
        Ok(DeliveryOutcome::DeadLettered { error_type })
    }
}

#[async_trait]
impl<L, P, B> DeliveryHandler for StockDecreaseConsumer<L, P, B>
where
    L: StockLedger,
    P: StockEventPublisher,
    B: MessageBroker,
{
    type Outcome = DeliveryOutcome;

    fn queue(&self) -> &str {
        &self.channels().decrease
    }

    async fn handle(&self, delivery: &Delivery) -> Result<DeliveryOutcome> {
        StockDecreaseConsumer::handle(self, delivery).await
    }
}

/// Recovers the order id from a payload that failed to decode as a whole.
pub(crate) fn order_id_hint(payload: &serde_json::Value) -> Option<OrderId> {
    payload
        .get("orderId")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
}

/// Polls one queue and feeds deliveries to a handler until shut down.
pub struct ConsumerWorker<H, B> {
    id: usize,
    handler: Arc<H>,
    broker: B,
    poll_interval: Duration,
}

impl<H, B> ConsumerWorker<H, B>
where
    H: DeliveryHandler,
    B: MessageBroker,
{
    pub fn new(id: usize, handler: Arc<H>, broker: B, poll_interval: Duration) -> Self {
        Self {
            id,
            handler,
            broker,
            poll_interval,
        }
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    ///
    /// A delivery being handled when shutdown arrives runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let queue = self.handler.queue().to_string();
        tracing::info!(worker = self.id, %queue, "consumer started");

        while !*shutdown.borrow() {
            let idle = match self.poll_once().await {
                Ok(handled) => !handled,
                Err(e) => {
                    tracing::error!(worker = self.id, %queue, error = %e, "receive failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(worker = self.id, %queue, "consumer stopped");
    }

    /// Receives and handles at most one delivery.
    ///
    /// Returns false if the queue was empty. A delivery whose handling
    /// failed is requeued.
    pub async fn poll_once(&self) -> Result<bool> {
        let Some(delivery) = self.broker.receive(self.handler.queue()).await? else {
            return Ok(false);
        };

        match self.handler.handle(&delivery).await {
            Ok(outcome) => {
                tracing::debug!(
                    worker = self.id,
                    tag = delivery.tag,
                    ?outcome,
                    "delivery handled"
                );
            }
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    tag = delivery.tag,
                    error = %e,
                    "delivery handling failed, requeueing"
                );
                self.broker.requeue(&delivery).await?;
            }
        }

        Ok(true)
    }
}
