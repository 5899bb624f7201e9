//! Cumulative network byte counters
//!
//! Only raw counters are reported here; turning them into throughput is the rate
//! calculator's job.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sysinfo::Networks;
use tracing::trace;

use crate::config::NetworkProbe;
use crate::error::{SourceError, SourceResult};

use super::containers::parse_net_io;
use super::{CollectContext, RawMetrics, SourceAdapter, SourceKind, command};

pub struct NetworkSource {
    probe: NetworkProbe,
    docker_binary: String,
    networks: Arc<Mutex<Option<Networks>>>,
}

impl NetworkSource {
    pub fn new(probe: NetworkProbe, docker_binary: &str) -> Self {
        Self {
            probe,
            docker_binary: docker_binary.to_string(),
            networks: Arc::new(Mutex::new(None)),
        }
    }

    async fn host_counters(&self) -> SourceResult<(u64, u64)> {
        let networks = self.networks.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = networks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let networks = guard.get_or_insert_with(Networks::new_with_refreshed_list);
            networks.refresh(true);

            let interfaces: Vec<(&str, u64, u64)> = networks
                .list()
                .iter()
                .map(|(name, data)| (name.as_str(), data.total_received(), data.total_transmitted()))
                .collect();

            sum_interfaces(&interfaces)
        })
        .await
        .map_err(|e| SourceError::unavailable(format!("network probe task failed: {e}")))?
    }

    async fn container_counters(&self, ctx: &CollectContext) -> SourceResult<(u64, u64)> {
        let output = command::run(
            &self.docker_binary,
            &["stats", "--no-stream", "--format", "{{.NetIO}}"],
            ctx,
        )
        .await?;

        parse_net_io(&output)
    }
}

/// Sum counters over all interfaces except loopback
fn sum_interfaces(interfaces: &[(&str, u64, u64)]) -> SourceResult<(u64, u64)> {
    let external: Vec<_> = interfaces
        .iter()
        .filter(|(name, _, _)| *name != "lo" && !name.starts_with("lo0"))
        .collect();

    if external.is_empty() {
        return Err(SourceError::unavailable("no network interfaces found"));
    }

    Ok(external.iter().fold((0u64, 0u64), |(rx, tx), (_, r, t)| {
        (rx.saturating_add(*r), tx.saturating_add(*t))
    }))
}

#[async_trait]
impl SourceAdapter for NetworkSource {
    fn name(&self) -> &str {
        "network"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Network
    }

    async fn collect(&self, ctx: &CollectContext) -> SourceResult<RawMetrics> {
        let (rx_bytes, tx_bytes) = match self.probe {
            NetworkProbe::Host => self.host_counters().await?,
            NetworkProbe::Containers => self.container_counters(ctx).await?,
        };

        trace!("network counters: rx={rx_bytes} tx={tx_bytes}");

        Ok(RawMetrics::Network {
            rx_bytes,
            tx_bytes,
            sampled_at_millis: Utc::now().timestamp_millis(),
        })
    }
}
