//! Converts cumulative counter samples into per-second rates
//!
//! Only the latest sample per stream is retained. The policy below is what turns a
//! container byte counter into a throughput figure without negative values or
//! spikes when a process restart resets the counter:
//!
//! ```text
//! first sample          → store, no rate
//! Δt <= 0               → discard sample, keep baseline, no rate (clock skew)
//! Δv <  0               → store as new baseline, no rate (counter reset)
//! otherwise             → rate = Δv / Δt_seconds, store as baseline
//! ```

use std::collections::HashMap;

use tracing::trace;

use crate::CounterSample;

/// Per-stream rate calculator
#[derive(Debug, Default)]
pub struct RateCalculator {
    latest: HashMap<String, CounterSample>,
}

impl RateCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a sample and get the rate per second since the previous one, if any
    pub fn rate(&mut self, sample: CounterSample) -> Option<f64> {
        let Some(previous) = self.latest.get(&sample.stream_id) else {
            trace!("{}: first sample, establishing baseline", sample.stream_id);
            self.latest.insert(sample.stream_id.clone(), sample);
            return None;
        };

        let delta_millis = sample.timestamp_millis - previous.timestamp_millis;
        if delta_millis <= 0 {
            trace!(
                "{}: non-increasing timestamp ({delta_millis}ms), discarding sample",
                sample.stream_id
            );
            return None;
        }

        if sample.cumulative_value < previous.cumulative_value {
            trace!(
                "{}: counter reset ({} -> {}), rebasing",
                sample.stream_id, previous.cumulative_value, sample.cumulative_value
            );
            self.latest.insert(sample.stream_id.clone(), sample);
            return None;
        }

        let delta_value = (sample.cumulative_value - previous.cumulative_value) as f64;
        let rate = (delta_value / (delta_millis as f64 / 1000.0)).max(0.0);

        self.latest.insert(sample.stream_id.clone(), sample);
        Some(rate)
    }

    /// Latest baseline for a stream
    pub fn baseline(&self, stream_id: &str) -> Option<&CounterSample> {
        self.latest.get(stream_id)
    }

    pub fn forget(&mut self, stream_id: &str) {
        self.latest.remove(stream_id);
    }
}
