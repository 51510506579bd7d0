use thiserror::Error;

/// Errors that can occur when talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The delivery was already acknowledged or never handed out.
    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(i64),

    /// The broker refused the operation.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
