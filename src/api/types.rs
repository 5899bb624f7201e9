//! API response types
//!
//! Field names are camelCase to match the serialized `CollectionState`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Alert, ConnectionStatus, ServiceHealth};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,

    /// Whether the collection scheduler is running
    pub collecting: bool,

    pub connection_status: ConnectionStatus,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesResponse {
    pub services: Vec<ServiceHealth>,
    pub count: usize,
    pub down: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub firing: usize,
    pub unacknowledged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeResponse {
    pub id: String,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub api_calls_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,

    /// Hits over all lookups, `None` before the first lookup
    pub cache_hit_ratio: Option<f64>,

    pub stale_sources: Vec<String>,
    pub subscribers: usize,
}
