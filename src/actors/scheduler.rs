//! CollectorScheduler - drives the collection cycles
//!
//! ## Cycle
//!
//! ```text
//! Idle → Collecting → Merging → Committing → Idle
//!          │            │           │
//!          │            │           └─ StateStore::commit, then notify subscribers
//!          │            └─ rates, draft snapshot, alert evaluation
//!          └─ one task per source, bounded by max_concurrency, each with its own deadline
//! ```
//!
//! A failed source keeps its last known contribution and is listed in
//! `stale_sources`. When every source fails the previous snapshot is kept and the
//! state only moves to `disconnected`. Retries are unconditional: the next tick
//! always runs a new cycle.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at, timeout_at};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::{self, AlertRule, AlertTransition};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{CycleError, SourceError, SourceResult};
use crate::notify::AlertNotifier;
use crate::rate::RateCalculator;
use crate::sources::{CollectContext, RawMetrics, SourceAdapter, SourceKind};
use crate::store::StateStore;
use crate::{CollectionState, ConnectionStatus, CounterSample, MetricSnapshot, ServiceHealth, UsageMetrics};

use super::messages::{CyclePhase, CycleReport, SchedulerCommand};

/// Consecutive fully-failed cycles before the failure is escalated to `error!`
const ESCALATION_THRESHOLD: u32 = 3;

const NETWORK_RX_STREAM: &str = "network.rx";
const NETWORK_TX_STREAM: &str = "network.tx";

struct SourceOutcome {
    name: String,
    kind: SourceKind,
    result: SourceResult<RawMetrics>,
}

struct CollectedCycle {
    /// In registration order
    outcomes: Vec<SourceOutcome>,

    /// Most recent failure by completion time
    last_failure: Option<String>,
}

pub struct CollectorScheduler {
    sources: Vec<Arc<dyn SourceAdapter>>,
    cache: Arc<TtlCache<RawMetrics>>,
    store: Arc<StateStore>,
    notifier: Option<Arc<AlertNotifier>>,

    /// Per-stream counter baselines for throughput
    rates: RateCalculator,

    rules: Vec<AlertRule>,
    max_resolved_history: usize,

    tick_interval: Duration,
    per_source_timeout: Duration,
    max_concurrency: usize,
    max_capacity_bps: f64,
    collect_on_start: bool,

    consecutive_failures: u32,

    command_rx: mpsc::Receiver<SchedulerCommand>,
    shutdown_rx: watch::Receiver<bool>,
    phase_tx: watch::Sender<CyclePhase>,
}

impl CollectorScheduler {
    pub fn new(
        config: &Config,
        sources: Vec<Arc<dyn SourceAdapter>>,
        cache: Arc<TtlCache<RawMetrics>>,
        store: Arc<StateStore>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        shutdown_rx: watch::Receiver<bool>,
        phase_tx: watch::Sender<CyclePhase>,
    ) -> Self {
        Self {
            sources,
            cache,
            store,
            notifier: None,
            rates: RateCalculator::new(),
            rules: config.alerts.rules.clone(),
            max_resolved_history: config.alerts.max_resolved_history,
            tick_interval: config.collection.tick_interval().max(Duration::from_secs(1)),
            per_source_timeout: config.collection.per_source_timeout(),
            max_concurrency: config.collection.max_concurrency.max(1),
            max_capacity_bps: config.sources.network.max_capacity_mbps * 1_000_000.0,
            collect_on_start: config.collection.collect_on_start,
            consecutive_failures: 0,
            command_rx,
            shutdown_rx,
            phase_tx,
        }
    }

    pub fn with_notifier(mut self, notifier: Option<Arc<AlertNotifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    fn ticker(&self, immediate: bool) -> Interval {
        let mut ticker = if immediate {
            interval(self.tick_interval)
        } else {
            interval_at(Instant::now() + self.tick_interval, self.tick_interval)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Run the scheduler's main loop
    ///
    /// Runs until shutdown is signalled, a Shutdown command arrives or the last
    /// handle is dropped.
    #[instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn run(mut self) {
        info!("starting collector scheduler");

        let mut ticker = self.ticker(self.collect_on_start);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(report) => trace!("cycle committed version {}", report.version),
                        Err(CycleError::Cancelled) => break,
                        Err(e) => error!("collection cycle failed: {e}"),
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("every handle dropped");
                        break;
                    };

                    match cmd {
                        SchedulerCommand::CollectNow { respond_to } => {
                            debug!("received CollectNow command");
                            let result = self.run_cycle().await;
                            let cancelled = matches!(result, Err(CycleError::Cancelled));
                            let _ = respond_to.send(result);
                            if cancelled {
                                break;
                            }
                        }

                        SchedulerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.tick_interval = Duration::from_secs(interval_secs.max(1));
                            ticker = self.ticker(false);
                        }

                        SchedulerCommand::AcknowledgeAlert { alert_id, respond_to } => {
                            let _ = respond_to.send(self.acknowledge(&alert_id));
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                true = shutdown_signalled(&mut self.shutdown_rx) => {
                    debug!("shutdown signalled");
                    break;
                }
            }
        }

        self.set_phase(CyclePhase::Idle);
        info!("collector scheduler stopped");
    }

    fn set_phase(&self, phase: CyclePhase) {
        trace!("phase: {phase:?}");
        self.phase_tx.send_replace(phase);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Run one full cycle and commit its result
    #[instrument(skip(self))]
    async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let cycle_start = Instant::now();

        self.set_phase(CyclePhase::Collecting);
        let collected = match self.collect_all(cycle_start).await {
            Ok(collected) => collected,
            Err(e) => {
                self.set_phase(CyclePhase::Idle);
                return Err(e);
            }
        };

        self.set_phase(CyclePhase::Merging);
        let CollectedCycle {
            outcomes,
            last_failure,
        } = collected;

        let previous = self.store.read();
        let total = outcomes.len();
        let failed = outcomes.iter().filter(|outcome| outcome.result.is_err()).count();
        let connection_status = ConnectionStatus::from_outcomes(failed, total);

        let mut state = (*previous).clone();
        state.connection_status = connection_status;
        state.stale_sources = outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.name.clone())
            .collect();
        state.api_calls_count = previous.api_calls_count + total as u64;

        let mut transitions = Vec::new();

        if connection_status == ConnectionStatus::Disconnected {
            let last = last_failure.unwrap_or_else(|| "no sources registered".to_string());
            self.record_total_failure(&last);
            state.last_error = Some(last);
        } else {
            if self.consecutive_failures > 0 {
                info!(
                    "sources recovered after {} failed cycle(s)",
                    self.consecutive_failures
                );
            }
            self.consecutive_failures = 0;

            let (snapshot, services) = self.merge(&previous, &outcomes);
            let evaluation = alerts::evaluate(
                &snapshot,
                &services,
                &previous.alerts,
                &self.rules,
                self.max_resolved_history,
                snapshot.timestamp,
            );

            state.snapshot = Arc::new(snapshot);
            state.services = services;
            state.alerts = evaluation.alerts;
            state.last_error = last_failure;
            transitions = evaluation.transitions;
        }

        self.set_phase(CyclePhase::Committing);
        if self.is_shutting_down() {
            self.set_phase(CyclePhase::Idle);
            return Err(CycleError::Cancelled);
        }

        let stats = self.cache.stats();
        state.cache_hits = stats.hits;
        state.cache_misses = stats.misses;

        let committed = self.store.commit(state);
        self.set_phase(CyclePhase::Idle);

        let alerts_fired = transitions
            .iter()
            .filter(|transition| matches!(transition, AlertTransition::Fired(_)))
            .count();
        let alerts_resolved = transitions.len() - alerts_fired;
        self.dispatch_notifications(transitions);

        let elapsed = cycle_start.elapsed();
        if elapsed > self.tick_interval {
            warn!(
                "{}",
                CycleError::Overrun {
                    elapsed,
                    budget: self.tick_interval
                }
            );
        }

        debug!(
            "cycle committed: version={} status={:?} failed={failed}/{total} in {}ms",
            committed.version,
            committed.connection_status,
            elapsed.as_millis()
        );

        Ok(CycleReport {
            version: committed.version,
            connection_status,
            succeeded: total - failed,
            failed,
            stale_sources: committed.stale_sources.clone(),
            alerts_fired,
            alerts_resolved,
            elapsed,
        })
    }

    /// Fan out to every source and wait for all of them
    ///
    /// Shutdown aborts the in-flight tasks and cancels the cycle.
    async fn collect_all(&mut self, cycle_start: Instant) -> Result<CollectedCycle, CycleError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let cycle_deadline = cycle_start + self.tick_interval;
        let per_source_timeout = self.per_source_timeout;

        let mut tasks = JoinSet::new();
        let mut task_sources = HashMap::new();

        for (index, source) in self.sources.iter().enumerate() {
            let source = source.clone();
            let semaphore = semaphore.clone();

            let handle = tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let started = Instant::now();
                        let deadline = (started + per_source_timeout).min(cycle_deadline);
                        let ctx = CollectContext::new(deadline);

                        match timeout_at(deadline, source.collect(&ctx)).await {
                            Ok(result) => result,
                            Err(_) => Err(SourceError::Timeout(started.elapsed())),
                        }
                    }
                    // Closed on shutdown; queued sources are never invoked
                    Err(_) => Err(SourceError::unavailable("collection cancelled")),
                };
                (index, result)
            });
            task_sources.insert(handle.id(), index);
        }

        let mut results: Vec<Option<SourceResult<RawMetrics>>> =
            self.sources.iter().map(|_| None).collect();
        let mut last_failure = None;

        loop {
            tokio::select! {
                joined = tasks.join_next_with_id() => {
                    let (index, result) = match joined {
                        None => break,
                        Some(Ok((_, (index, result)))) => (index, result),
                        Some(Err(e)) => {
                            let Some(index) = task_sources.get(&e.id()).copied() else {
                                error!("untracked collector task failed: {e}");
                                continue;
                            };
                            error!("{}: collector task failed: {e}", self.sources[index].name());
                            (index, Err(SourceError::unavailable(format!("collector task failed: {e}"))))
                        }
                    };

                    if let Err(e) = &result {
                        warn!("{}: {e}", self.sources[index].name());
                        last_failure = Some(format!("{}: {e}", self.sources[index].name()));
                    }
                    results[index] = Some(result);
                }

                true = shutdown_signalled(&mut self.shutdown_rx) => {
                    debug!("shutdown during collection, discarding cycle");
                    semaphore.close();
                    tasks.abort_all();
                    return Err(CycleError::Cancelled);
                }
            }
        }

        let outcomes = self
            .sources
            .iter()
            .zip(results)
            .map(|(source, result)| SourceOutcome {
                name: source.name().to_string(),
                kind: source.kind(),
                result: result.unwrap_or_else(|| Err(SourceError::unavailable("no result"))),
            })
            .collect();

        Ok(CollectedCycle {
            outcomes,
            last_failure,
        })
    }

    /// Build the draft snapshot from the previous one and this cycle's successes
    fn merge(
        &mut self,
        previous: &CollectionState,
        outcomes: &[SourceOutcome],
    ) -> (MetricSnapshot, Vec<ServiceHealth>) {
        let mut snapshot = (*previous.snapshot).clone();
        snapshot.timestamp = Utc::now();
        snapshot.network.max_capacity_bps = self.max_capacity_bps;

        let mut services = Vec::new();

        for outcome in outcomes {
            match &outcome.result {
                Ok(RawMetrics::System {
                    cpu_usage_percent,
                    memory_used_bytes,
                    memory_total_bytes,
                }) => {
                    snapshot.cpu.usage_percent = *cpu_usage_percent;
                    snapshot.memory = UsageMetrics::new(*memory_used_bytes, *memory_total_bytes);
                }

                Ok(RawMetrics::Disk {
                    used_bytes,
                    total_bytes,
                }) => snapshot.disk = UsageMetrics::new(*used_bytes, *total_bytes),

                Ok(RawMetrics::Network {
                    rx_bytes,
                    tx_bytes,
                    sampled_at_millis,
                }) => {
                    let rx = CounterSample::new(NETWORK_RX_STREAM, *sampled_at_millis, *rx_bytes);
                    let tx = CounterSample::new(NETWORK_TX_STREAM, *sampled_at_millis, *tx_bytes);

                    // No rate (baseline, skew, reset) keeps the previous figure
                    if let Some(bytes_per_sec) = self.rates.rate(rx) {
                        snapshot.network.rx_rate_bps = bytes_per_sec * 8.0;
                    }
                    if let Some(bytes_per_sec) = self.rates.rate(tx) {
                        snapshot.network.tx_rate_bps = bytes_per_sec * 8.0;
                    }
                }

                Ok(RawMetrics::Containers(counts)) => snapshot.containers = *counts,

                Ok(RawMetrics::Service(health)) => services.push(health.clone()),

                Err(_) if outcome.kind == SourceKind::Service => {
                    if let Some(last_known) = previous
                        .services
                        .iter()
                        .find(|service| service.name == outcome.name)
                    {
                        services.push(last_known.clone());
                    }
                }

                Err(_) => {}
            }
        }

        (snapshot, services)
    }

    fn record_total_failure(&mut self, last: &str) {
        self.consecutive_failures += 1;
        let err = CycleError::AllSourcesFailed {
            last: last.to_string(),
        };

        match self.consecutive_failures.cmp(&ESCALATION_THRESHOLD) {
            Ordering::Less => warn!("{err}"),
            Ordering::Equal => error!(
                "{err} ({} consecutive cycles, still retrying)",
                self.consecutive_failures
            ),
            Ordering::Greater => warn!(
                "{err} ({} consecutive cycles)",
                self.consecutive_failures
            ),
        }
    }

    fn acknowledge(&self, alert_id: &str) -> bool {
        let current = self.store.read();

        match alerts::acknowledge(&current.alerts, alert_id) {
            Some(alerts) => {
                let mut state = (*current).clone();
                state.alerts = alerts;
                self.store.commit(state);
                debug!("acknowledged alert {alert_id}");
                true
            }
            None => false,
        }
    }

    fn dispatch_notifications(&self, transitions: Vec<AlertTransition>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if transitions.is_empty() {
            return;
        }

        let notifier = notifier.clone();
        tokio::spawn(async move {
            notifier.notify(&transitions).await;
        });
    }
}

/// Resolves to `true` once shutdown is signalled, `false` when it no longer can be
async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    shutdown_rx.wait_for(|stop| *stop).await.is_ok()
}

/// Handle for controlling the CollectorScheduler
///
/// Cloneable; the scheduler stops when shutdown is requested or every handle is gone.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    phase_rx: watch::Receiver<CyclePhase>,
}

impl SchedulerHandle {
    /// Spawn the scheduler as a tokio task
    pub fn spawn(
        config: &Config,
        sources: Vec<Arc<dyn SourceAdapter>>,
        cache: Arc<TtlCache<RawMetrics>>,
        store: Arc<StateStore>,
        notifier: Option<Arc<AlertNotifier>>,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(CyclePhase::Idle);

        let scheduler =
            CollectorScheduler::new(config, sources, cache, store, cmd_rx, shutdown_rx, phase_tx)
                .with_notifier(notifier);

        let task = tokio::spawn(scheduler.run());

        (
            Self {
                sender: cmd_tx,
                shutdown_tx: Arc::new(shutdown_tx),
                phase_rx,
            },
            task,
        )
    }

    /// Run one cycle now and wait for its report
    pub async fn collect_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::CollectNow { respond_to: tx })
            .await
            .context("failed to send CollectNow command")?;

        Ok(rx.await.context("failed to receive cycle report")??)
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Returns `false` when no alert has this id
    pub async fn acknowledge_alert(&self, alert_id: impl Into<String>) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::AcknowledgeAlert {
                alert_id: alert_id.into(),
                respond_to: tx,
            })
            .await
            .context("failed to send AcknowledgeAlert command")?;

        rx.await.context("failed to receive acknowledgement")
    }

    /// Signal shutdown; an in-flight cycle is discarded
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let _ = self.sender.send(SchedulerCommand::Shutdown).await;
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase_rx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
