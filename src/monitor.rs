//! Entry point for consumers of the collection core
//!
//! A `Monitor` owns the state store, the shared cache and the registered sources.
//! Consumers call `start()` once at boot (repeated calls are no-ops while the
//! scheduler runs) and then only `read()` or `subscribe()`.

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::actors::{CycleReport, SchedulerHandle};
use crate::alerts;
use crate::cache::TtlCache;
use crate::config::Config;
use crate::notify::AlertNotifier;
use crate::sources::{RawMetrics, SourceAdapter, build_sources};
use crate::store::{StateStore, StateSubscription};
use crate::CollectionState;

struct Running {
    handle: SchedulerHandle,
    task: JoinHandle<()>,
}

pub struct Monitor {
    config: Config,
    store: Arc<StateStore>,
    cache: Arc<TtlCache<RawMetrics>>,
    sources: Vec<Arc<dyn SourceAdapter>>,
    notifier: Option<Arc<AlertNotifier>>,
    running: Mutex<Option<Running>>,
}

impl Monitor {
    /// Build every source the configuration enables
    ///
    /// Fails when the configuration does not validate.
    pub fn new(config: Config) -> Result<Self> {
        let cache = Arc::new(TtlCache::new());
        let sources = build_sources(&config, &cache);
        Self::with_sources(config, cache, sources)
    }

    /// Use the given sources instead of the configured ones
    ///
    /// `cache` should be the cache the sources were wrapped with, so its counters
    /// end up in the committed state.
    pub fn with_sources(
        config: Config,
        cache: Arc<TtlCache<RawMetrics>>,
        sources: Vec<Arc<dyn SourceAdapter>>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(StateStore::new(config.collection.subscriber_buffer));
        let notifier = AlertNotifier::from_targets(&config.alerts.notify).map(Arc::new);

        Ok(Self {
            config,
            store,
            cache,
            sources,
            notifier,
            running: Mutex::new(None),
        })
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self) -> Option<SchedulerHandle> {
        self.running()
            .as_ref()
            .filter(|running| !running.handle.is_closed())
            .map(|running| running.handle.clone())
    }

    /// Start collecting unless already running
    ///
    /// Returns `true` when this call started the scheduler.
    pub fn start(&self) -> bool {
        let mut running = self.running();

        if let Some(current) = running.as_ref()
            && !current.handle.is_closed()
        {
            debug!("collection already running");
            return false;
        }

        info!("starting collection with {} sources", self.sources.len());
        let (handle, task) = SchedulerHandle::spawn(
            &self.config,
            self.sources.clone(),
            self.cache.clone(),
            self.store.clone(),
            self.notifier.clone(),
        );
        *running = Some(Running { handle, task });
        true
    }

    pub fn is_running(&self) -> bool {
        self.handle().is_some()
    }

    pub fn read(&self) -> Arc<CollectionState> {
        self.store.read()
    }

    pub fn subscribe(&self) -> StateSubscription {
        self.store.subscribe()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Acknowledge an alert; `Ok(false)` for unknown ids
    ///
    /// Goes through the scheduler while it runs so the store keeps a single writer.
    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<bool> {
        if let Some(handle) = self.handle() {
            return handle.acknowledge_alert(alert_id).await;
        }

        let current = self.store.read();
        match alerts::acknowledge(&current.alerts, alert_id) {
            Some(updated) => {
                let mut state = (*current).clone();
                state.alerts = updated;
                self.store.commit(state);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run a cycle immediately
    pub async fn collect_now(&self) -> Result<CycleReport> {
        let Some(handle) = self.handle() else {
            bail!("collection is not running");
        };
        handle.collect_now().await
    }

    /// Stop the scheduler and wait for it to exit
    pub async fn shutdown(&self) {
        let running = self.running().take();

        let Some(Running { handle, task }) = running else {
            return;
        };

        handle.shutdown().await;
        if let Err(e) = task.await {
            error!("collector scheduler task failed: {e}");
        }
        info!("collection stopped");
    }
}
