//! CPU and memory of the host running the platform

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::System;
use tracing::trace;

use crate::error::{SourceError, SourceResult};

use super::{CollectContext, RawMetrics, SourceAdapter, SourceKind};

/// Reads CPU and memory through `sysinfo`
///
/// The `System` handle lives across calls because CPU usage is computed from the
/// difference between two refreshes; the very first call reports 0%.
pub struct SystemSource {
    system: Arc<Mutex<System>>,
}

impl SystemSource {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for SystemSource {
    fn name(&self) -> &str {
        "system"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::System
    }

    async fn collect(&self, _ctx: &CollectContext) -> SourceResult<RawMetrics> {
        let system = self.system.clone();

        let raw = tokio::task::spawn_blocking(move || {
            let mut sys = system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            sys.refresh_cpu_usage();
            sys.refresh_memory();

            let cpu = sys.global_cpu_usage() as f64;
            RawMetrics::System {
                cpu_usage_percent: if cpu.is_finite() { cpu.clamp(0.0, 100.0) } else { 0.0 },
                memory_used_bytes: sys.used_memory(),
                memory_total_bytes: sys.total_memory(),
            }
        })
        .await
        .map_err(|e| SourceError::unavailable(format!("system probe task failed: {e}")))?;

        if let RawMetrics::System {
            memory_total_bytes: 0,
            ..
        } = raw
        {
            return Err(SourceError::unavailable("system reports no memory"));
        }

        trace!("system metrics: {raw:?}");
        Ok(raw)
    }
}
