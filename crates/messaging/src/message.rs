use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// Header carrying how many times a message has been republished for retry.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Header carrying why a message was dead-lettered.
pub const ERROR_TYPE_HEADER: &str = "x-error-type";

/// Classification attached to a dead-lettered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockErrorType {
    /// A business rule rejected the decrement; retrying cannot help.
    OutOfStock,
    /// Transient failures outlasted the retry budget.
    RetryExceeded,
    /// Anything else, including payloads that cannot be decoded.
    UnknownError,
}

impl StockErrorType {
    /// Returns the wire name of the classification.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockErrorType::OutOfStock => "OUT_OF_STOCK",
            StockErrorType::RetryExceeded => "RETRY_EXCEEDED",
            StockErrorType::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for StockErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StockErrorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "OUT_OF_STOCK" => Ok(StockErrorType::OutOfStock),
            "RETRY_EXCEEDED" => Ok(StockErrorType::RetryExceeded),
            "UNKNOWN_ERROR" => Ok(StockErrorType::UnknownError),
            other => Err(format!("unknown error type: {other}")),
        }
    }
}

/// Free-form message headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHeaders(BTreeMap<String, serde_json::Value>);

impl MessageHeaders {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.0.insert(name.into(), value);
    }

    /// Returns the retry count, treating an absent or non-numeric header as 0.
    pub fn retry_count(&self) -> u32 {
        self.get(RETRY_COUNT_HEADER)
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    }

    pub fn set_retry_count(&mut self, retry_count: u32) {
        self.insert(RETRY_COUNT_HEADER, retry_count.into());
    }

    /// Returns the dead-letter classification, if present and recognised.
    pub fn error_type(&self) -> Option<StockErrorType> {
        self.get(ERROR_TYPE_HEADER)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn set_error_type(&mut self, error_type: StockErrorType) {
        self.insert(ERROR_TYPE_HEADER, error_type.as_str().into());
    }
}

/// A message: JSON payload plus headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub headers: MessageHeaders,
}

impl Message {
    /// Creates a message with no headers.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            headers: MessageHeaders::new(),
        }
    }

    /// Serializes a value into a message with no headers.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Decodes the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Returns a copy carrying the given retry count.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.headers.set_retry_count(retry_count);
        self
    }

    /// Returns a copy carrying the given dead-letter classification.
    pub fn with_error_type(mut self, error_type: StockErrorType) -> Self {
        self.headers.set_error_type(error_type);
        self
    }
}

/// A message handed to a consumer, awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Broker-assigned tag identifying this delivery.
    pub tag: i64,
    /// Queue the message was received from.
    pub queue: String,
    /// Lease token. Once a lease expires and the message is handed out
    /// again, acks and requeues carrying the old token are ignored.
    pub lease: i32,
    pub message: Message,
}
