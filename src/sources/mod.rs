//! Source adapters
//!
//! Each adapter wraps one external probe and turns its answer into `RawMetrics` or a
//! typed `SourceError`. Adapters know nothing about each other or about the state
//! store; they only read their probe.
//!
//! ## Adapters
//!
//! - **SystemSource**: CPU and memory via `sysinfo`
//! - **DiskSource**: usage of one mount point via `sysinfo`
//! - **NetworkSource**: cumulative rx/tx bytes from host interfaces or the container runtime
//! - **ContainerSource**: running/healthy/stopped/unhealthy counts from the container runtime
//! - **ServiceHealthSource**: one named service, probed over HTTP or through its container

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::SourceResult;
use crate::{ContainerCounts, ServiceHealth};

pub mod command;
pub mod containers;
pub mod disk;
pub mod network;
pub mod service;
pub mod system;

pub use containers::ContainerSource;
pub use disk::DiskSource;
pub use network::NetworkSource;
pub use service::ServiceHealthSource;
pub use system::SystemSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    System,
    Disk,
    Network,
    Containers,
    Service,
}

/// Source-specific raw values returned by one adapter call
#[derive(Debug, Clone, PartialEq)]
pub enum RawMetrics {
    System {
        cpu_usage_percent: f64,
        memory_used_bytes: u64,
        memory_total_bytes: u64,
    },
    Disk {
        used_bytes: u64,
        total_bytes: u64,
    },
    /// Cumulative counters, converted to rates by the scheduler
    Network {
        rx_bytes: u64,
        tx_bytes: u64,
        sampled_at_millis: i64,
    },
    Containers(ContainerCounts),
    Service(ServiceHealth),
}

/// Per-call context carrying the deadline the adapter has to answer by
#[derive(Debug, Clone, Copy)]
pub struct CollectContext {
    pub deadline: Instant,
}

impl CollectContext {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Uniform interface over one external probe
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique name, used as cache key and in `stale_sources`
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    async fn collect(&self, ctx: &CollectContext) -> SourceResult<RawMetrics>;
}

/// Adapter decorator serving repeated calls from a shared TTL cache
pub struct CachedSource {
    inner: Arc<dyn SourceAdapter>,
    cache: Arc<TtlCache<RawMetrics>>,
    ttl: Duration,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn SourceAdapter>, cache: Arc<TtlCache<RawMetrics>>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl SourceAdapter for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    async fn collect(&self, ctx: &CollectContext) -> SourceResult<RawMetrics> {
        self.cache
            .get_or_compute(self.inner.name(), self.ttl, || self.inner.collect(ctx))
            .await
    }
}

/// Build every adapter the configuration enables, cached where a TTL is set
pub fn build_sources(config: &Config, cache: &Arc<TtlCache<RawMetrics>>) -> Vec<Arc<dyn SourceAdapter>> {
    let sources_config = &config.sources;
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if sources_config.system {
        sources.push(Arc::new(SystemSource::new()));
    }

    if sources_config.disk.enabled {
        sources.push(Arc::new(DiskSource::new(&sources_config.disk.mount_point)));
    }

    if sources_config.network.enabled {
        sources.push(Arc::new(NetworkSource::new(
            sources_config.network.probe,
            &sources_config.docker_binary,
        )));
    }

    if sources_config.containers {
        sources.push(Arc::new(ContainerSource::new(&sources_config.docker_binary)));
    }

    for service in &sources_config.services {
        sources.push(Arc::new(ServiceHealthSource::new(
            service.clone(),
            &sources_config.docker_binary,
        )));
    }

    sources
        .into_iter()
        .map(|source| match config.cache_ttl(source.kind()) {
            Some(ttl) => Arc::new(CachedSource::new(source, cache.clone(), ttl)) as Arc<dyn SourceAdapter>,
            None => source,
        })
        .collect()
}
