//! Service configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use decrease::DEFAULT_RETRY_MAX;
use messaging::Channels;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address of the health/metrics server (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on in-memory backends
/// - `WORKER_COUNT`: decrement consumers to run (default: `2`)
/// - `POLL_INTERVAL_MS`: idle wait between empty polls (default: `200`)
/// - `RETRY_MAX`: retries before a transient failure is dead-lettered (default: `5`)
/// - `STOCK_DECREASE_QUEUE`, `STOCK_DECREASE_RETRY_QUEUE`,
///   `STOCK_DECREASE_DEAD_QUEUE`, `STOCK_DECREASE_SUCCESS_QUEUE`,
///   `ORDER_CREATED_QUEUE`, `ORDER_PROCESS_FAILED_QUEUE`: channel names
/// - `STOCK_DECREASE_RETRY_TTL_MS`: retry delay (default: `5000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub retry_max: u32,
    pub channels: Channels,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let channels = Channels {
            decrease: string("STOCK_DECREASE_QUEUE", defaults.channels.decrease),
            decrease_retry: string(
                "STOCK_DECREASE_RETRY_QUEUE",
                defaults.channels.decrease_retry,
            ),
            retry_ttl: parse_var(&lookup, "STOCK_DECREASE_RETRY_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.channels.retry_ttl),
            decrease_dead: string("STOCK_DECREASE_DEAD_QUEUE", defaults.channels.decrease_dead),
            decrease_success: string(
                "STOCK_DECREASE_SUCCESS_QUEUE",
                defaults.channels.decrease_success,
            ),
            order_created: string("ORDER_CREATED_QUEUE", defaults.channels.order_created),
            order_process_failed: string(
                "ORDER_PROCESS_FAILED_QUEUE",
                defaults.channels.order_process_failed,
            ),
        };

        Self {
            host: string("HOST", defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: string("RUST_LOG", defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            worker_count: parse_var(&lookup, "WORKER_COUNT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.worker_count),
            poll_interval: parse_var(&lookup, "POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            retry_max: parse_var(&lookup, "RETRY_MAX").unwrap_or(defaults.retry_max),
            channels,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            worker_count: 2,
            poll_interval: Duration::from_millis(200),
            retry_max: DEFAULT_RETRY_MAX,
            channels: Channels::default(),
        }
    }
}
