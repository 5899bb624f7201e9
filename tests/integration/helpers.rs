//! Test helpers shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use platform_monitor::{
    ContainerCounts,
    cache::TtlCache,
    config::Config,
    error::{SourceError, SourceResult},
    monitor::Monitor,
    sources::{CollectContext, RawMetrics, SourceAdapter, SourceKind},
};

/// Source answering from a script
///
/// Entries are consumed in order; the last one repeats once the script runs out.
pub struct ScriptedSource {
    name: String,
    kind: SourceKind,
    script: Mutex<VecDeque<SourceResult<RawMetrics>>>,
    calls: AtomicUsize,
    delay: Mutex<Duration>,
}

impl ScriptedSource {
    pub fn new(name: &str, kind: SourceKind, script: Vec<SourceResult<RawMetrics>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            kind,
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Replace the script with one repeating answer
    pub fn respond_with(&self, result: SourceResult<RawMetrics>) {
        *self.script.lock().unwrap() = VecDeque::from([result]);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn collect(&self, _ctx: &CollectContext) -> SourceResult<RawMetrics> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(SourceError::unavailable("empty script")))
        }
    }
}

pub fn system(cpu: f64, memory_percent: f64) -> RawMetrics {
    RawMetrics::System {
        cpu_usage_percent: cpu,
        memory_used_bytes: (memory_percent * 1_000.0) as u64,
        memory_total_bytes: 100_000,
    }
}

pub fn disk(used: u64, total: u64) -> RawMetrics {
    RawMetrics::Disk {
        used_bytes: used,
        total_bytes: total,
    }
}

pub fn network(rx_bytes: u64, tx_bytes: u64, sampled_at_millis: i64) -> RawMetrics {
    RawMetrics::Network {
        rx_bytes,
        tx_bytes,
        sampled_at_millis,
    }
}

pub fn containers(running: u32, unhealthy: u32) -> RawMetrics {
    RawMetrics::Containers(ContainerCounts {
        running,
        healthy: running - unhealthy,
        stopped: 0,
        unhealthy,
    })
}

pub fn unavailable(msg: &str) -> SourceResult<RawMetrics> {
    Err(SourceError::unavailable(msg))
}

/// Config with a long tick so only `collect_now` drives cycles
pub fn manual_config() -> Config {
    let mut config = Config::default();
    config.collection.collect_on_start = false;
    config.collection.tick_interval_secs = 3600;
    config.collection.per_source_timeout_ms = 500;
    config
}

pub fn as_sources(sources: &[Arc<ScriptedSource>]) -> Vec<Arc<dyn SourceAdapter>> {
    sources
        .iter()
        .map(|source| source.clone() as Arc<dyn SourceAdapter>)
        .collect()
}

/// Started monitor over scripted sources
pub fn start_monitor(config: Config, sources: &[Arc<ScriptedSource>]) -> Monitor {
    let monitor = Monitor::with_sources(config, Arc::new(TtlCache::new()), as_sources(sources)).unwrap();
    assert!(monitor.start());
    monitor
}
