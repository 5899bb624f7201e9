//! Alert endpoints

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{AcknowledgeResponse, AlertsResponse},
};

/// GET /api/v1/alerts
///
/// Firing alerts first, then recently resolved ones
pub async fn list_alerts(State(state): State<ApiState>) -> Json<AlertsResponse> {
    let current = state.monitor.read();

    Json(AlertsResponse {
        firing: current.firing_alerts().count(),
        unacknowledged: current
            .firing_alerts()
            .filter(|alert| !alert.acknowledged)
            .count(),
        alerts: current.alerts.clone(),
    })
}

/// POST /api/v1/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AcknowledgeResponse>> {
    if !state.monitor.acknowledge_alert(&id).await? {
        return Err(ApiError::NotFound(format!("alert '{id}' not found")));
    }

    info!("alert {id} acknowledged");

    Ok(Json(AcknowledgeResponse {
        id,
        acknowledged: true,
    }))
}
