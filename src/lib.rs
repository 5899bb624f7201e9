pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod rate;
pub mod sources;
pub mod store;
pub mod util;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable, internally consistent set of metric values
///
/// Produced exactly once per completed collection cycle and never mutated after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuMetrics,
    pub memory: UsageMetrics,
    pub disk: UsageMetrics,
    pub network: NetworkMetrics,
    pub containers: ContainerCounts,
}

impl MetricSnapshot {
    /// Zeroed snapshot used before the first cycle completes
    pub fn placeholder() -> Self {
        Self {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            cpu: CpuMetrics::default(),
            memory: UsageMetrics::default(),
            disk: UsageMetrics::default(),
            network: NetworkMetrics::default(),
            containers: ContainerCounts::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    pub usage_percent: f64,
}

/// Used/total pair for memory and disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

impl UsageMetrics {
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 * 100.0 / total_bytes as f64
        };

        Self {
            used_bytes,
            total_bytes,
            percent,
        }
    }
}

/// Network throughput in bits per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub rx_rate_bps: f64,
    pub tx_rate_bps: f64,
    pub max_capacity_bps: f64,
}

impl NetworkMetrics {
    pub fn rx_mbps(&self) -> f64 {
        self.rx_rate_bps / 1_000_000.0
    }

    pub fn tx_mbps(&self) -> f64 {
        self.tx_rate_bps / 1_000_000.0
    }

    /// Busiest direction relative to the configured link capacity
    pub fn utilization_percent(&self) -> f64 {
        if self.max_capacity_bps <= 0.0 {
            return 0.0;
        }
        self.rx_rate_bps.max(self.tx_rate_bps) / self.max_capacity_bps * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerCounts {
    pub running: u32,
    pub healthy: u32,
    pub stopped: u32,
    pub unhealthy: u32,
}

/// A point-in-time reading of a monotonically non-decreasing counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSample {
    pub stream_id: String,
    pub timestamp_millis: i64,
    pub cumulative_value: u64,
}

impl CounterSample {
    pub fn new(stream_id: impl Into<String>, timestamp_millis: i64, cumulative_value: u64) -> Self {
        Self {
            stream_id: stream_id.into(),
            timestamp_millis,
            cumulative_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Stopped,
}

impl HealthStatus {
    /// Whether the service should count as down for alerting
    pub fn is_down(self) -> bool {
        matches!(self, HealthStatus::Unhealthy | HealthStatus::Stopped)
    }
}

/// Health of one monitored service, keyed by `name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub first_fired_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_firing(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Degraded,
    Disconnected,
}

impl ConnectionStatus {
    /// Classify a cycle by how many of its sources failed
    pub fn from_outcomes(failed: usize, total: usize) -> Self {
        if total == 0 || failed >= total {
            ConnectionStatus::Disconnected
        } else if failed > 0 {
            ConnectionStatus::Degraded
        } else {
            ConnectionStatus::Connected
        }
    }
}

/// Aggregate root held by the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionState {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub snapshot: Arc<MetricSnapshot>,
    pub services: Vec<ServiceHealth>,
    pub alerts: Vec<Alert>,
    pub connection_status: ConnectionStatus,
    pub last_error: Option<String>,
    pub stale_sources: Vec<String>,
    pub api_calls_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl CollectionState {
    /// Zeroed state held until the first commit
    pub fn initial() -> Self {
        Self {
            version: 0,
            updated_at: Utc::now(),
            snapshot: Arc::new(MetricSnapshot::placeholder()),
            services: Vec::new(),
            alerts: Vec::new(),
            connection_status: ConnectionStatus::Disconnected,
            last_error: None,
            stale_sources: Vec::new(),
            api_calls_count: 0,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    pub fn firing_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|alert| alert.is_firing())
    }
}

impl Default for CollectionState {
    fn default() -> Self {
        Self::initial()
    }
}
