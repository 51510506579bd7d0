//! Stock history: the append-only ledger of applied mutations.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{HistoryId, OrderId, ProductId, StockId, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::StockError;
use crate::stock::StockLine;

/// Why a stock line changed.
///
/// `Inbound`, `Cancel` and `Return` put units back on the shelf and carry a
/// positive delta; `Outbound` takes them off and carries a negative one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockEventType {
    Inbound,
    Outbound,
    Cancel,
    Return,
}

impl StockEventType {
    /// Returns true for event types that remove units.
    pub fn is_outbound(&self) -> bool {
        matches!(self, StockEventType::Outbound)
    }

    /// Applies this event type's sign to an unsigned quantity.
    pub fn signed(&self, quantity: u32) -> i64 {
        let quantity = i64::from(quantity);
        if self.is_outbound() { -quantity } else { quantity }
    }

    /// Returns the stored name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockEventType::Inbound => "INBOUND",
            StockEventType::Outbound => "OUTBOUND",
            StockEventType::Cancel => "CANCEL",
            StockEventType::Return => "RETURN",
        }
    }
}

impl std::fmt::Display for StockEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StockEventType {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INBOUND" => Ok(StockEventType::Inbound),
            "OUTBOUND" => Ok(StockEventType::Outbound),
            "CANCEL" => Ok(StockEventType::Cancel),
            "RETURN" => Ok(StockEventType::Return),
            other => Err(StockError::UnknownEventType(other.to_string())),
        }
    }
}

/// Immutable record of one applied stock mutation.
///
/// Outbound records tied to an order double as the idempotency key: the ledger keeps
/// at most one outbound record per (order, stock line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockHistory {
    id: HistoryId,
    stock_id: StockId,
    order_id: Option<OrderId>,
    product_id: ProductId,
    variant_id: VariantId,
    event_type: StockEventType,
    changed_quantity: i64,
    created_at: DateTime<Utc>,
}

impl StockHistory {
    /// Creates a record after validating the delta against the event type.
    pub fn new(
        line: &StockLine,
        order_id: Option<OrderId>,
        event_type: StockEventType,
        changed_quantity: i64,
    ) -> Result<Self, StockError> {
        validate_change(event_type, changed_quantity)?;

        Ok(Self {
            id: HistoryId::new(),
            stock_id: line.id(),
            order_id,
            product_id: line.product_id(),
            variant_id: line.variant_id(),
            event_type,
            changed_quantity,
            created_at: Utc::now(),
        })
    }

    /// Records the initial stock-in of a freshly registered line.
    pub fn inbound(line: &StockLine) -> Result<Self, StockError> {
        let event_type = StockEventType::Inbound;
        Self::new(line, None, event_type, event_type.signed(line.quantity()))
    }

    /// Records a decrement applied on behalf of an order.
    pub fn outbound(
        line: &StockLine,
        order_id: OrderId,
        quantity: u32,
    ) -> Result<Self, StockError> {
        let event_type = StockEventType::Outbound;
        Self::new(line, Some(order_id), event_type, event_type.signed(quantity))
    }

    /// Records units put back on a line by a cancellation or a return.
    pub fn restock(
        line: &StockLine,
        order_id: Option<OrderId>,
        event_type: StockEventType,
        quantity: u32,
    ) -> Result<Self, StockError> {
        Self::new(line, order_id, event_type, event_type.signed(quantity))
    }

    /// Rebuilds a record from its stored representation.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: HistoryId,
        stock_id: StockId,
        order_id: Option<OrderId>,
        product_id: ProductId,
        variant_id: VariantId,
        event_type: StockEventType,
        changed_quantity: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            stock_id,
            order_id,
            product_id,
            variant_id,
            event_type,
            changed_quantity,
            created_at,
        }
    }

    pub fn id(&self) -> HistoryId {
        self.id
    }

    pub fn stock_id(&self) -> StockId {
        self.stock_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn event_type(&self) -> StockEventType {
        self.event_type
    }

    pub fn changed_quantity(&self) -> i64 {
        self.changed_quantity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn validate_change(event_type: StockEventType, changed: i64) -> Result<(), StockError> {
    if changed == 0 {
        return Err(StockError::ZeroChange);
    }
    if event_type.is_outbound() != (changed < 0) {
        return Err(StockError::SignMismatch {
            event_type,
            changed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> StockLine {
        StockLine::register(ProductId::new(), VariantId::new(), 10).unwrap()
    }

    #[test]
    fn outbound_record_is_negative_and_tied_to_order() {
        let line = line();
        let order_id = OrderId::new();

        let record = StockHistory::outbound(&line, order_id, 4).unwrap();
        assert_eq!(record.changed_quantity(), -4);
        assert_eq!(record.event_type(), StockEventType::Outbound);
        assert_eq!(record.order_id(), Some(order_id));
        assert_eq!(record.stock_id(), line.id());
        assert_eq!(record.variant_id(), line.variant_id());
    }

    #[test]
    fn inbound_record_has_no_order() {
        let line = line();
        let record = StockHistory::inbound(&line).unwrap();
        assert_eq!(record.changed_quantity(), 10);
        assert_eq!(record.order_id(), None);
    }

    #[test]
    fn restock_kinds_are_positive() {
        let line = line();
        for kind in [StockEventType::Cancel, StockEventType::Return] {
            let record = StockHistory::restock(&line, Some(OrderId::new()), kind, 2).unwrap();
            assert_eq!(record.changed_quantity(), 2);
        }
    }

    #[test]
    fn zero_delta_is_rejected() {
        let result = StockHistory::outbound(&line(), OrderId::new(), 0);
        assert_eq!(result, Err(StockError::ZeroChange));
    }

    #[test]
    fn sign_must_match_event_type() {
        let line = line();
        assert!(matches!(
            StockHistory::new(&line, None, StockEventType::Outbound, 3),
            Err(StockError::SignMismatch { .. })
        ));
        assert!(matches!(
            StockHistory::new(&line, None, StockEventType::Inbound, -3),
            Err(StockError::SignMismatch { .. })
        ));
        assert!(matches!(
            StockHistory::new(&line, None, StockEventType::Return, -1),
            Err(StockError::SignMismatch { .. })
        ));
    }

    #[test]
    fn event_type_name_roundtrip() {
        for kind in [
            StockEventType::Inbound,
            StockEventType::Outbound,
            StockEventType::Cancel,
            StockEventType::Return,
        ] {
            assert_eq!(kind.as_str().parse::<StockEventType>().unwrap(), kind);
        }
        assert!("SHRINKAGE".parse::<StockEventType>().is_err());
    }

    #[test]
    fn event_type_serializes_screaming_case() {
        let json = serde_json::to_string(&StockEventType::Outbound).unwrap();
        assert_eq!(json, "\"OUTBOUND\"");
    }
}
