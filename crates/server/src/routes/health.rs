// crates/server/src/routes/health.rs
//! Health and readiness endpoints.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Response for the health check endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub mock_mode: bool,
    pub gpu_available: bool,
    pub models_loaded: Vec<String>,
    pub uptime_secs: u64,
    /// Generation slots free right now.
    pub permits_available: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    pub status: String,
}

/// GET /api/v1/health - Health check endpoint.
///
/// Returns server status, version, backend facts and uptime.
#[utoipa::path(get, path = "/api/v1/health", tag = "health",
    responses((status = 200, description = "Server is up", body = HealthResponse)))]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let info = state.backend().info();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mock_mode: info.mock_mode,
        gpu_available: info.gpu_available,
        models_loaded: info.loaded_names(),
        uptime_secs: state.uptime_secs(),
        permits_available: state.gate().available(),
    })
}

/// GET /api/v1/ready - Readiness probe.
#[utoipa::path(get, path = "/api/v1/ready", tag = "health",
    responses((status = 200, description = "Ready to accept jobs", body = ReadyResponse)))]
pub async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready".to_string(),
    })
}

/// Create the health routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            mock_mode: true,
            gpu_available: false,
            models_loaded: vec!["mock".to_string()],
            uptime_secs: 42,
            permits_available: 4,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"version\":\"0.1.0\""));
        assert!(json.contains("\"models_loaded\":[\"mock\"]"));
        assert!(json.contains("\"uptime_secs\":42"));
    }
}
