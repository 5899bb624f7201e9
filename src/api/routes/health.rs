//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Always answers "ok" while the process serves requests; collection problems are
/// reported through `connectionStatus`.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let current = state.monitor.read();

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        collecting: state.monitor.is_running(),
        connection_status: current.connection_status,
        version: current.version,
    })
}
