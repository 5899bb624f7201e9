//! Container counts from the container runtime CLI

use async_trait::async_trait;
use tracing::trace;

use crate::ContainerCounts;
use crate::error::{SourceError, SourceResult};

use super::{CollectContext, RawMetrics, SourceAdapter, SourceKind, command};

const PS_FORMAT: &str = "{{.State}}\t{{.Status}}";

pub struct ContainerSource {
    docker_binary: String,
}

impl ContainerSource {
    pub fn new(docker_binary: &str) -> Self {
        Self {
            docker_binary: docker_binary.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for ContainerSource {
    fn name(&self) -> &str {
        "containers"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Containers
    }

    async fn collect(&self, ctx: &CollectContext) -> SourceResult<RawMetrics> {
        let output = command::run(&self.docker_binary, &["ps", "-a", "--format", PS_FORMAT], ctx).await?;
        let counts = parse_ps_output(&output)?;
        trace!("container counts: {counts:?}");
        Ok(RawMetrics::Containers(counts))
    }
}

/// Count containers from `State<TAB>Status` lines
///
/// A container is unhealthy when its healthcheck says so or it is stuck restarting,
/// healthy when it runs and is neither unhealthy nor still starting its healthcheck.
pub fn parse_ps_output(output: &str) -> SourceResult<ContainerCounts> {
    let mut counts = ContainerCounts::default();

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let (state, status) = line
            .split_once('\t')
            .ok_or_else(|| SourceError::parse(format!("unexpected container line '{line}'")))?;
        let state = state.trim().to_ascii_lowercase();
        let status = status.to_ascii_lowercase();

        let unhealthy = status.contains("(unhealthy)") || state == "restarting";
        let starting = status.contains("(health: starting)");

        match state.as_str() {
            "running" => {
                counts.running += 1;
                if !unhealthy && !starting {
                    counts.healthy += 1;
                }
            }
            "exited" | "dead" | "created" => counts.stopped += 1,
            "paused" | "restarting" | "removing" => {}
            other => {
                return Err(SourceError::parse(format!("unknown container state '{other}'")));
            }
        }

        if unhealthy {
            counts.unhealthy += 1;
        }
    }

    Ok(counts)
}

/// Parse a size like `1.5MB`, `512kB`, `3.2GiB` or `0B` into bytes
pub fn parse_size(text: &str) -> SourceResult<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| SourceError::parse(format!("invalid size '{text}'")))?;

    let multiplier: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        other => return Err(SourceError::parse(format!("unknown size unit '{other}'"))),
    };

    Ok((value * multiplier).round() as u64)
}

/// Sum the `rx / tx` pairs printed by `docker stats --format '{{.NetIO}}'`
pub fn parse_net_io(output: &str) -> SourceResult<(u64, u64)> {
    let mut rx_total = 0u64;
    let mut tx_total = 0u64;

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        // Containers without a network report "--"
        if line == "--" || line == "-- / --" {
            continue;
        }

        let (rx, tx) = line
            .split_once('/')
            .ok_or_else(|| SourceError::parse(format!("unexpected NetIO value '{line}'")))?;

        rx_total = rx_total.saturating_add(parse_size(rx)?);
        tx_total = tx_total.saturating_add(parse_size(tx)?);
    }

    Ok((rx_total, tx_total))
}
