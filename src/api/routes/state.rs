//! Collection state endpoints

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::{CollectionState, MetricSnapshot};

/// GET /api/v1/state
pub async fn get_state(State(state): State<ApiState>) -> Json<Arc<CollectionState>> {
    Json(state.monitor.read())
}

/// GET /api/v1/snapshot
pub async fn get_snapshot(State(state): State<ApiState>) -> Json<Arc<MetricSnapshot>> {
    Json(state.monitor.read().snapshot.clone())
}
