//! Concurrency tests
//!
//! - Readers never observe a torn state while commits happen
//! - Concurrent cache misses collapse into one computation
//! - Slow subscribers never hold up the committer

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Barrier;

use platform_monitor::{
    CollectionState, CpuMetrics, MetricSnapshot,
    cache::TtlCache,
    sources::{CachedSource, CollectContext, SourceAdapter, SourceKind},
    store::StateStore,
};

use super::helpers::*;

/// Every field is derived from `n` so a mix of two commits is detectable
fn state_for(n: u64) -> CollectionState {
    let mut state = CollectionState::initial();
    state.snapshot = Arc::new(MetricSnapshot {
        cpu: CpuMetrics {
            usage_percent: n as f64,
        },
        ..MetricSnapshot::placeholder()
    });
    state.api_calls_count = n;
    state.cache_hits = n;
    state.cache_misses = n;
    state.stale_sources = vec![n.to_string()];
    state
}

fn assert_consistent(state: &CollectionState) {
    let n = state.api_calls_count;
    assert_eq!(state.version, n, "version and counters from different commits");
    assert_eq!(state.snapshot.cpu.usage_percent, n as f64);
    assert_eq!(state.cache_hits, n);
    assert_eq!(state.cache_misses, n);
    if n > 0 {
        assert_eq!(state.stale_sources, vec![n.to_string()]);
    }
}

const READERS: usize = 50;

/// Distinct committed versions each reader has to observe
const VERSIONS_PER_READER: usize = 3;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_during_commits_are_never_torn() {
    let store = Arc::new(StateStore::new(16));
    let committing = Arc::new(AtomicBool::new(true));
    let caught_up = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(READERS + 1));

    let mut readers = Vec::new();
    for _ in 0..READERS {
        let store = store.clone();
        let committing = committing.clone();
        let caught_up = caught_up.clone();
        let barrier = barrier.clone();
        readers.push(tokio::spawn(async move {
            let mut last_version = store.read().version;
            let mut seen = 0usize;
            barrier.wait().await;

            while committing.load(Ordering::SeqCst) {
                let state = store.read();
                assert_consistent(&state);
                assert!(state.version >= last_version, "versions went backwards");
                if state.version > last_version {
                    seen += 1;
                    if seen == VERSIONS_PER_READER {
                        caught_up.fetch_add(1, Ordering::SeqCst);
                    }
                }
                last_version = state.version;
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    barrier.wait().await;

    // Keep committing until every reader has watched several commits land
    let mut n = 0;
    while n < 500 || caught_up.load(Ordering::SeqCst) < READERS {
        n += 1;
        store.commit(state_for(n));
        tokio::task::yield_now().await;
        assert!(n < 1_000_000, "readers never overlapped the commits");
    }
    committing.store(false, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() >= VERSIONS_PER_READER);
    }
    assert_eq!(store.read().version, n);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_share_one_computation() {
    let source = ScriptedSource::new("disk", SourceKind::Disk, vec![Ok(disk(5, 10))]);
    source.set_delay(Duration::from_millis(50));

    let cache = Arc::new(TtlCache::new());
    let cached = Arc::new(CachedSource::new(
        source.clone(),
        cache.clone(),
        Duration::from_secs(60),
    ));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let cached = cached.clone();
        tasks.spawn(async move {
            let ctx = CollectContext::with_timeout(Duration::from_secs(5));
            cached.collect(&ctx).await
        });
    }

    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), disk(5, 10));
    }

    assert_eq!(source.calls(), 1);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 19);
}

#[tokio::test]
async fn test_slow_subscriber_does_not_block_commits() {
    let store = StateStore::new(4);
    let mut slow = store.subscribe();

    for n in 1..=20 {
        store.commit(state_for(n));
    }

    // Oldest states were dropped; the subscriber resumes with the newest ones
    let first = slow.recv().await.unwrap();
    assert!(first.version > 1);
    let mut last = first.version;
    while let Some(state) = slow.try_recv() {
        assert!(state.version > last);
        last = state.version;
    }
    assert_eq!(last, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_is_respected() {
    struct Gauge {
        name: String,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SourceAdapter for Gauge {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Service
        }

        async fn collect(
            &self,
            _ctx: &CollectContext,
        ) -> platform_monitor::error::SourceResult<platform_monitor::sources::RawMetrics> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Err(platform_monitor::error::SourceError::unavailable("gauge only"))
        }
    }

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let sources: Vec<Arc<dyn SourceAdapter>> = (0..12)
        .map(|i| {
            Arc::new(Gauge {
                name: format!("service-{i}"),
                active: active.clone(),
                peak: peak.clone(),
            }) as Arc<dyn SourceAdapter>
        })
        .collect();

    let mut config = manual_config();
    config.collection.max_concurrency = 3;
    let monitor =
        platform_monitor::monitor::Monitor::with_sources(config, Arc::new(TtlCache::new()), sources).unwrap();
    monitor.start();

    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.failed, 12);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 1);

    monitor.shutdown().await;
}
