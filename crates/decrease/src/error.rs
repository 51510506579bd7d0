//! Decrease error types.

use domain::{StockError, StockId, VariantId};
use ledger::LedgerError;
use messaging::{BrokerError, StockErrorType};
use thiserror::Error;

/// Why a batch decrement did not apply.
///
/// The variant decides what the consumer does with the delivery: business
/// and malformed-input failures are dead-lettered at once, conflicts and
/// infrastructure failures are retried.
#[derive(Debug, Error)]
pub enum DecreaseFailure {
    /// A line holds fewer units than requested. Retrying cannot help.
    #[error(
        "Out of stock on option {variant_id} (line {stock_id}): requested {requested}, available {available}"
    )]
    OutOfStock {
        stock_id: StockId,
        variant_id: VariantId,
        available: u32,
        requested: u32,
    },

    /// The batch itself is malformed. Retrying cannot help.
    #[error("Invalid decrease batch: {0}")]
    InvalidBatch(String),

    /// Another writer moved a line on first; a fresh read may succeed.
    #[error("Concurrent update: {0}")]
    Conflict(#[source] LedgerError),

    /// Any other ledger failure.
    #[error("Ledger failure: {0}")]
    Unknown(#[source] LedgerError),
}

impl DecreaseFailure {
    /// Returns true if the batch may succeed when delivered again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DecreaseFailure::Conflict(_) | DecreaseFailure::Unknown(_)
        )
    }

    /// Returns the classification used when this failure ends a message's
    /// lifecycle on the dead-letter channel.
    pub fn dead_letter_type(&self) -> StockErrorType {
        match self {
            DecreaseFailure::OutOfStock { .. } => StockErrorType::OutOfStock,
            DecreaseFailure::Conflict(_) => StockErrorType::RetryExceeded,
            DecreaseFailure::InvalidBatch(_) | DecreaseFailure::Unknown(_) => {
                StockErrorType::UnknownError
            }
        }
    }
}

impl From<StockError> for DecreaseFailure {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock {
                stock_id,
                variant_id,
                available,
                requested,
            } => DecreaseFailure::OutOfStock {
                stock_id,
                variant_id,
                available,
                requested,
            },
            other => DecreaseFailure::InvalidBatch(other.to_string()),
        }
    }
}

impl From<LedgerError> for DecreaseFailure {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Domain(stock_err) => stock_err.into(),
            LedgerError::ConcurrencyConflict { .. } => DecreaseFailure::Conflict(err),
            other => DecreaseFailure::Unknown(other),
        }
    }
}

/// Infrastructure failures while routing or acknowledging a delivery.
///
/// These leave the delivery unacknowledged; the broker hands it out again.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The broker rejected a publish, ack or requeue.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// An outgoing event could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for consumer results.
pub type Result<T> = std::result::Result<T, ConsumerError>;

#[cfg(test)]
mod tests {
    use domain::Version;

    use super::*;

    #[test]
    fn insufficient_stock_is_out_of_stock() {
        let failure: DecreaseFailure = LedgerError::Domain(StockError::InsufficientStock {
            stock_id: StockId::new(),
            variant_id: VariantId::new(),
            available: 3,
            requested: 5,
        })
        .into();

        assert!(matches!(
            failure,
            DecreaseFailure::OutOfStock {
                available: 3,
                requested: 5,
                ..
            }
        ));
        assert!(!failure.is_retryable());
        assert_eq!(failure.dead_letter_type(), StockErrorType::OutOfStock);
    }

    #[test]
    fn conflict_is_retryable_and_exhausts_as_retry_exceeded() {
        let failure: DecreaseFailure = LedgerError::ConcurrencyConflict {
            stock_id: StockId::new(),
            expected: Version::initial(),
            actual: Version::new(1),
        }
        .into();

        assert!(failure.is_retryable());
        assert_eq!(failure.dead_letter_type(), StockErrorType::RetryExceeded);
    }

    #[test]
    fn missing_line_is_retryable_and_exhausts_as_unknown() {
        let failure: DecreaseFailure = LedgerError::StockNotFound(VariantId::new()).into();

        assert!(matches!(failure, DecreaseFailure::Unknown(_)));
        assert!(failure.is_retryable());
        assert_eq!(failure.dead_letter_type(), StockErrorType::UnknownError);
    }

    #[test]
    fn invalid_amount_is_not_retryable() {
        let failure: DecreaseFailure = StockError::InvalidAmount(0).into();

        assert!(matches!(failure, DecreaseFailure::InvalidBatch(_)));
        assert!(!failure.is_retryable());
        assert_eq!(failure.dead_letter_type(), StockErrorType::UnknownError);
    }
}
