//! Delivery lifecycle.

use messaging::StockErrorType;
use serde::{Deserialize, Serialize};

/// The state of one delivery while the consumer handles it.
///
/// State transitions:
/// ```text
/// Received ──┬──► Succeeded
///            ├──► RetryScheduled
///            └──► DeadLettered
/// ```
/// Every terminal state acknowledges the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeliveryState {
    /// Handed to the consumer, not yet routed.
    #[default]
    Received,

    /// The batch was applied, now or by an earlier delivery (terminal state).
    Succeeded,

    /// A copy was parked on the delay channel (terminal state).
    RetryScheduled,

    /// A copy was moved to the dead-letter channel (terminal state).
    DeadLettered,
}

impl DeliveryState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Received)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Received => "Received",
            DeliveryState::Succeeded => "Succeeded",
            DeliveryState::RetryScheduled => "RetryScheduled",
            DeliveryState::DeadLettered => "DeadLettered",
        }
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the consumer finished with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Succeeded,
    RetryScheduled { retry_count: u32 },
    DeadLettered { error_type: StockErrorType },
}

impl DeliveryOutcome {
    pub fn state(&self) -> DeliveryState {
        match self {
            DeliveryOutcome::Succeeded => DeliveryState::Succeeded,
            DeliveryOutcome::RetryScheduled { .. } => DeliveryState::RetryScheduled,
            DeliveryOutcome::DeadLettered { .. } => DeliveryState::DeadLettered,
        }
    }
}
