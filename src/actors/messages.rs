//! Message types for the collector scheduler
//!
//! Commands are sent to the scheduler over mpsc; replies travel back on oneshot
//! channels.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::ConnectionStatus;
use crate::error::CycleError;

/// Commands that can be sent to the CollectorScheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run one cycle immediately, outside the tick schedule
    CollectNow {
        respond_to: oneshot::Sender<Result<CycleReport, CycleError>>,
    },

    /// Replace the tick interval; the ticker restarts right away
    UpdateInterval { interval_secs: u64 },

    /// Mark an alert acknowledged; replies `false` for unknown ids
    AcknowledgeAlert {
        alert_id: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// Stop the tick loop
    Shutdown,
}

/// Where the scheduler currently is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Collecting,
    Merging,
    Committing,
}

/// Summary of one committed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Version of the committed state
    pub version: u64,
    pub connection_status: ConnectionStatus,
    pub succeeded: usize,
    pub failed: usize,
    pub stale_sources: Vec<String>,
    pub alerts_fired: usize,
    pub alerts_resolved: usize,
    pub elapsed: Duration,
}
