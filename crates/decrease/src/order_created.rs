//! Fan-out of order-created events into decrement requests.

use async_trait::async_trait;
use messaging::{Channels, Delivery, Message, MessageBroker};

use crate::consumer::{DeliveryHandler, order_id_hint};
use crate::error::Result;
use crate::events::{OrderCreatedEvent, StockDecreaseBatchEvent};
use crate::publisher::StockEventPublisher;
use crate::translator::{FailureTranslator, ORDER_CREATED_EVENT_PROCESS_FAILED};

/// What became of an order-created event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationOutcome {
    /// A decrement request was published to the main channel.
    Forwarded,
    /// The event was dropped; a failure event went out if the order was known.
    Rejected,
}

/// Turns order-created events into decrement requests.
///
/// Rejected events are acknowledged and dropped, never requeued.
pub struct OrderCreatedTranslator<B, P>
where
    B: MessageBroker,
    P: StockEventPublisher,
{
    broker: B,
    publisher: P,
    channels: Channels,
}

impl<B, P> OrderCreatedTranslator<B, P>
where
    B: MessageBroker,
    P: StockEventPublisher,
{
    pub fn new(broker: B, publisher: P, channels: Channels) -> Self {
        Self {
            broker,
            publisher,
            channels,
        }
    }

    /// Forwards one order-created delivery and acknowledges it.
    #[tracing::instrument(skip(self, delivery), fields(tag = delivery.tag))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<TranslationOutcome> {
        let outcome = self.translate(&delivery.message).await?;
        self.broker.ack(delivery).await?;
        Ok(outcome)
    }

    async fn forward(&self, event: OrderCreatedEvent) -> messaging::Result<()> {
        tracing::info!(
            order_id = %event.order_id,
            products = event.products.len(),
            "order created"
        );
        let batch = StockDecreaseBatchEvent::from(event);
        self.broker
            .publish(&self.channels.decrease, Message::json(&batch)?)
            .await
    }

    async fn translate(&self, message: &Message) -> Result<TranslationOutcome> {
        let order_id = order_id_hint(&message.payload);

        let forwarded = match message.decode::<OrderCreatedEvent>() {
            Ok(event) => self.forward(event).await,
            Err(e) => Err(e.into()),
        };

        match forwarded {
            Ok(()) => Ok(TranslationOutcome::Forwarded),
            Err(e) => {
                tracing::error!(?order_id, error = %e, "order-created event rejected");
                if let Some(order_id) = order_id {
                    let event = FailureTranslator::to_compensating_event(
                        order_id,
                        ORDER_CREATED_EVENT_PROCESS_FAILED,
                        FailureTranslator::resolve_message(ORDER_CREATED_EVENT_PROCESS_FAILED),
                    );
                    self.publisher.publish_failure(event).await?;
                }
                Ok(TranslationOutcome::Rejected)
            }
        }
    }
}

#[async_trait]
impl<B, P> DeliveryHandler for OrderCreatedTranslator<B, P>
where
    B: MessageBroker,
    P: StockEventPublisher,
{
    type Outcome = TranslationOutcome;

    fn queue(&self) -> &str {
        &self.channels.order_created
    }

    async fn handle(&self, delivery: &Delivery) -> Result<TranslationOutcome> {
        OrderCreatedTranslator::handle(self, delivery).await
    }
}
