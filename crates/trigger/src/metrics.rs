//! Trigger metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Trigger metrics
#[derive(Debug, Default)]
pub struct TriggerMetrics {
    /// Events from observed HIGHs
    pub real_events: AtomicU64,

    /// Events synthesized from two LOWs
    pub compensated_events: AtomicU64,

    /// Frames that failed to parse
    pub malformed_frames: AtomicU64,

    /// Telegrams for other channels
    pub ignored_frames: AtomicU64,

    /// Interval samples outside the plausible range
    pub rejected_samples: AtomicU64,
}

impl TriggerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_real(&self) {
        self.real_events.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sorter_pulse_events_total", "kind" => "real").increment(1);
    }

    pub fn record_compensated(&self) {
        self.compensated_events.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sorter_pulse_events_total", "kind" => "compensated").increment(1);
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sorter_trigger_malformed_frames_total").increment(1);
    }

    pub fn record_ignored(&self) {
        self.ignored_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_sample(&self) {
        self.rejected_samples.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sorter_interval_samples_rejected_total").increment(1);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> TriggerMetricsSnapshot {
        TriggerMetricsSnapshot {
            real_events: self.real_events.load(Ordering::Relaxed),
            compensated_events: self.compensated_events.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            ignored_frames: self.ignored_frames.load(Ordering::Relaxed),
            rejected_samples: self.rejected_samples.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerMetricsSnapshot {
    pub real_events: u64,
    pub compensated_events: u64,
    pub malformed_frames: u64,
    pub ignored_frames: u64,
    pub rejected_samples: u64,
}

impl TriggerMetricsSnapshot {
    pub fn total_events(&self) -> u64 {
        self.real_events + self.compensated_events
    }
}
