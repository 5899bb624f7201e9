//! Error types for metric collection
//!
//! Adapter failures never escape a cycle: the scheduler catches them at the fan-out
//! boundary, marks the source stale and reflects the outcome in `connection_status`.

use std::fmt;
use std::time::Duration;

/// Result type alias for source adapter calls
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors a source adapter can return instead of metrics
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The probe did not answer before its deadline
    Timeout(Duration),

    /// The probe could not be reached or refused to answer
    Unavailable(String),

    /// The probe answered with output that could not be interpreted
    ParseFailure(String),
}

impl SourceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        SourceError::Unavailable(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        SourceError::ParseFailure(msg.into())
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Timeout(after) => {
                write!(f, "source timed out after {}ms", after.as_millis())
            }
            SourceError::Unavailable(msg) => write!(f, "source unavailable: {}", msg),
            SourceError::ParseFailure(msg) => write!(f, "failed to parse source output: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::ParseFailure(err.to_string())
    }
}

/// Scheduler-level cycle errors
#[derive(Debug, Clone, PartialEq)]
pub enum CycleError {
    /// The cycle took longer than the tick interval; the next tick is skipped
    Overrun { elapsed: Duration, budget: Duration },

    /// Every registered source failed; surfaced only as `Disconnected` state
    AllSourcesFailed { last: String },

    /// Shutdown arrived while the cycle was in flight; nothing was committed
    Cancelled,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Overrun { elapsed, budget } => write!(
                f,
                "collection cycle overran: took {}ms with a budget of {}ms",
                elapsed.as_millis(),
                budget.as_millis()
            ),
            CycleError::AllSourcesFailed { last } => {
                write!(f, "all sources failed, last error: {}", last)
            }
            CycleError::Cancelled => write!(f, "collection cycle cancelled by shutdown"),
        }
    }
}

impl std::error::Error for CycleError {}
