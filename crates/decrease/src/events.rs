//! Wire events exchanged with the order service.
//!
//! Field names are camelCase on the wire; unknown fields are ignored.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, VariantId};
use serde::{Deserialize, Serialize};

/// One line of a decrement request: take `amount` units from the line
/// registered for the option `line_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecreaseLine {
    pub line_ref: VariantId,
    pub amount: u32,
}

impl DecreaseLine {
    pub fn new(line_ref: VariantId, amount: u32) -> Self {
        Self { line_ref, amount }
    }
}

/// Inbound request to decrement stock for every line of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDecreaseBatchEvent {
    pub order_id: OrderId,
    pub items: Vec<DecreaseLine>,
    pub ordered_at: DateTime<Utc>,
}

impl StockDecreaseBatchEvent {
    /// Creates a request stamped with the current time.
    pub fn new(order_id: OrderId, items: Vec<DecreaseLine>) -> Self {
        Self {
            order_id,
            items,
            ordered_at: Utc::now(),
        }
    }
}

/// A product as carried by the order service's order-created event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedProduct {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Published by the order service when an order is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub ordered_at: DateTime<Utc>,
    pub products: Vec<OrderedProduct>,
}

impl From<OrderCreatedEvent> for StockDecreaseBatchEvent {
    fn from(event: OrderCreatedEvent) -> Self {
        Self {
            order_id: event.order_id,
            items: event
                .products
                .into_iter()
                .map(|product| DecreaseLine::new(product.variant_id, product.quantity))
                .collect(),
            ordered_at: event.ordered_at,
        }
    }
}

/// Emitted once every line of an order has been decremented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDecreaseSuccessEvent {
    pub order_id: OrderId,
    pub decreased_at: DateTime<Utc>,
}

impl StockDecreaseSuccessEvent {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            decreased_at: Utc::now(),
        }
    }
}

/// Compensating event: the order could not be fulfilled by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProcessFailedEvent {
    pub order_id: OrderId,
    pub error_code: String,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn batch_event_uses_camel_case_fields() {
        let order_id = OrderId::new();
        let line_ref = VariantId::new();
        let event = StockDecreaseBatchEvent::new(order_id, vec![DecreaseLine::new(line_ref, 4)]);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["orderId"], json!(order_id.to_string()));
        assert_eq!(value["items"][0]["lineRef"], json!(line_ref.to_string()));
        assert_eq!(value["items"][0]["amount"], json!(4));
        assert!(value.get("orderedAt").is_some());
    }

    #[test]
    fn batch_event_ignores_unknown_fields() {
        let order_id = OrderId::new();
        let value = json!({
            "orderId": order_id.to_string(),
            "orderedAt": "2025-01-01T00:00:00Z",
            "items": [],
            "source": "checkout",
        });

        let event: StockDecreaseBatchEvent = serde_json::from_value(value).unwrap();
        assert_eq!(event.order_id, order_id);
        assert!(event.items.is_empty());
    }

    #[test]
    fn negative_amount_is_rejected() {
        let value = json!({
            "orderId": OrderId::new().to_string(),
            "orderedAt": "2025-01-01T00:00:00Z",
            "items": [{ "lineRef": VariantId::new().to_string(), "amount": -1 }],
        });

        assert!(serde_json::from_value::<StockDecreaseBatchEvent>(value).is_err());
    }

    #[test]
    fn order_created_maps_products_to_lines() {
        let first = VariantId::new();
        let second = VariantId::new();
        let created = OrderCreatedEvent {
            order_id: OrderId::new(),
            ordered_at: Utc::now(),
            products: vec![
                OrderedProduct {
                    product_id: ProductId::new(),
                    variant_id: first,
                    quantity: 2,
                },
                OrderedProduct {
                    product_id: ProductId::new(),
                    variant_id: second,
                    quantity: 1,
                },
            ],
        };

        let batch = StockDecreaseBatchEvent::from(created.clone());
        assert_eq!(batch.order_id, created.order_id);
        assert_eq!(batch.ordered_at, created.ordered_at);
        assert_eq!(
            batch.items,
            vec![DecreaseLine::new(first, 2), DecreaseLine::new(second, 1)]
        );
    }
}
