//! Short-TTL memoization in front of expensive sources
//!
//! Backed by `moka::future::Cache`. Concurrent misses for the same key collapse into
//! one underlying computation: the first caller runs it while the others wait and
//! then receive the same value. Each entry carries its own TTL, so sources of
//! different kinds can share one cache. Failures are never stored.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use tracing::trace;

/// A stored value together with its freshness window
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Expire every entry after the TTL it was stored with
struct EntryTtl;

impl<V> Expiry<String, CacheEntry<V>> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Clone)]
pub struct TtlCache<V> {
    cache: Cache<String, CacheEntry<V>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let cache = Cache::builder().expire_after(EntryTtl).build();

        Self {
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the cached value for `key`, or run `compute` and cache its result
    ///
    /// A lookup that ran `compute` counts as a miss, one served by another caller's
    /// computation or a stored entry counts as a hit. Failures are handed back to
    /// every waiting caller, never stored, and count as misses.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Clone + Send + Sync + 'static,
    {
        let computed = AtomicBool::new(false);

        let result = self
            .cache
            .try_get_with(key.to_string(), async {
                computed.store(true, Ordering::Relaxed);
                trace!("cache miss for {key}, computing");

                let value = compute().await?;
                Ok(CacheEntry {
                    key: key.to_string(),
                    value,
                    stored_at: Instant::now(),
                    ttl,
                })
            })
            .await;

        match result {
            Ok(entry) => {
                if computed.load(Ordering::Relaxed) {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    trace!("cache hit for {key}");
                }
                Ok(entry.value)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Err(Arc::unwrap_or_clone(e))
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
