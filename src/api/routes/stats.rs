//! Collection statistics endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::StatsResponse};

/// GET /api/v1/stats
///
/// Counters are read from the same committed state as the snapshot.
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let current = state.monitor.read();
    let lookups = current.cache_hits + current.cache_misses;

    Json(StatsResponse {
        version: current.version,
        updated_at: current.updated_at,
        api_calls_count: current.api_calls_count,
        cache_hits: current.cache_hits,
        cache_misses: current.cache_misses,
        cache_hit_ratio: (lookups > 0).then(|| current.cache_hits as f64 / lookups as f64),
        stale_sources: current.stale_sources.clone(),
        subscribers: state.monitor.store().subscriber_count(),
    })
}
