//! Failure translator: terminal failures to compensating events.

use chrono::Utc;
use common::OrderId;
use messaging::StockErrorType;

use crate::events::OrderProcessFailedEvent;

/// Error code for an order-created event that could not be turned into a
/// decrement request.
pub const ORDER_CREATED_EVENT_PROCESS_FAILED: &str = "ORDER_CREATED_EVENT_PROCESS_FAILED";

/// Builds the outward events that let the order flow compensate.
///
/// Construction only; callers publish the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureTranslator;

impl FailureTranslator {
    /// Builds a compensating event stamped with the current time.
    pub fn to_compensating_event(
        order_id: OrderId,
        error_code: &str,
        error_message: impl Into<String>,
    ) -> OrderProcessFailedEvent {
        OrderProcessFailedEvent {
            order_id,
            error_code: error_code.to_string(),
            error_message: error_message.into(),
            failed_at: Utc::now(),
        }
    }

    /// Builds the compensating event for a dead-letter classification.
    pub fn for_error_type(
        order_id: OrderId,
        error_type: StockErrorType,
    ) -> OrderProcessFailedEvent {
        let code = error_type.as_str();
        Self::to_compensating_event(order_id, code, Self::resolve_message(code))
    }

    /// Returns the operator-facing message for an error code.
    pub fn resolve_message(error_code: &str) -> &'static str {
        match error_code {
            "OUT_OF_STOCK" => "Not enough stock to fulfil the order.",
            "RETRY_EXCEEDED" => {
                "Stock could not be decreased after repeated attempts; the item is under heavy contention."
            }
            ORDER_CREATED_EVENT_PROCESS_FAILED => {
                "The order-created event could not be turned into a stock decrease request."
            }
            _ => "Stock decrease failed due to an unexpected error.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compensating_event_carries_code_and_message() {
        let order_id = OrderId::new();
        let event = FailureTranslator::to_compensating_event(order_id, "OUT_OF_STOCK", "gone");

        assert_eq!(event.order_id, order_id);
        assert_eq!(event.error_code, "OUT_OF_STOCK");
        assert_eq!(event.error_message, "gone");
    }

    #[test]
    fn error_type_event_uses_resolved_message() {
        let event =
            FailureTranslator::for_error_type(OrderId::new(), StockErrorType::RetryExceeded);

        assert_eq!(event.error_code, "RETRY_EXCEEDED");
        assert_eq!(
            event.error_message,
            FailureTranslator::resolve_message("RETRY_EXCEEDED")
        );
    }

    #[test]
    fn every_code_resolves_to_a_distinct_message() {
        let codes = [
            StockErrorType::OutOfStock.as_str(),
            StockErrorType::RetryExceeded.as_str(),
            StockErrorType::UnknownError.as_str(),
            ORDER_CREATED_EVENT_PROCESS_FAILED,
        ];
        let messages: std::collections::HashSet<_> = codes
            .iter()
            .map(|code| FailureTranslator::resolve_message(code))
            .collect();
        assert_eq!(messages.len(), codes.len());
    }

    #[test]
    fn unrecognised_code_falls_back_to_unknown_message() {
        assert_eq!(
            FailureTranslator::resolve_message("SOMETHING_ELSE"),
            FailureTranslator::resolve_message("UNKNOWN_ERROR")
        );
    }
}
