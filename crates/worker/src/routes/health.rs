//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Static facts about the running service, reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    /// `"memory"` or `"postgres"`.
    pub backend: &'static str,
    /// Number of decrement consumers.
    pub workers: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub info: ServiceInfo,
}

/// GET /health: returns service health status.
pub async fn check(State(info): State<ServiceInfo>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", info })
}
