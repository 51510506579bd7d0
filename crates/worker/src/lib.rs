//! Stock decrease consumer service.
//!
//! Runs the decrement consumers and the order-created translator against
//! either in-memory or PostgreSQL backends, and serves `/health` and
//! `/metrics` for operators.

pub mod config;
pub mod consumers;
pub mod routes;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use consumers::ConsumerSet;
pub use routes::health::ServiceInfo;

/// Creates the Axum application router.
pub fn create_app(info: ServiceInfo, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(info)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
