//! Service health endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::ServicesResponse};

/// GET /api/v1/services
pub async fn list_services(State(state): State<ApiState>) -> Json<ServicesResponse> {
    let current = state.monitor.read();
    let services = current.services.clone();

    Json(ServicesResponse {
        count: services.len(),
        down: services.iter().filter(|service| service.status.is_down()).count(),
        services,
    })
}
