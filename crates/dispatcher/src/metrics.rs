//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Reports delivered
    report_count: AtomicU64,
    /// Reports the sink failed to deliver
    failure_count: AtomicU64,
    /// Reports dropped due to full queue
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn report_count(&self) -> u64 {
        self.report_count.load(Ordering::Relaxed)
    }

    pub fn inc_report_count(&self) {
        self.report_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            report_count: self.report_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub report_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}

/// Where an actuation sequence stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Engage,
    Release,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Engage => "engage",
            Self::Release => "release",
        }
    }
}

/// Actuation counters
#[derive(Debug, Default)]
pub struct ActuationMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed_engage: AtomicU64,
    failed_release: AtomicU64,
    abandoned: AtomicU64,
}

impl ActuationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sorter_actuations_total", "result" => "started").increment(1);
    }

    pub fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sorter_actuations_total", "result" => "succeeded").increment(1);
    }

    pub fn record_failed(&self, stage: FailureStage) {
        match stage {
            FailureStage::Engage => self.failed_engage.fetch_add(1, Ordering::Relaxed),
            FailureStage::Release => self.failed_release.fetch_add(1, Ordering::Relaxed),
        };
        metrics::counter!(
            "sorter_actuations_total",
            "result" => "failed",
            "stage" => stage.as_str()
        )
        .increment(1);
    }

    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("sorter_actuations_total", "result" => "abandoned").increment(count);
    }

    pub fn snapshot(&self) -> ActuationSnapshot {
        ActuationSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed_engage: self.failed_engage.load(Ordering::Relaxed),
            failed_release: self.failed_release.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of actuation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuationSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed_engage: u64,
    pub failed_release: u64,
    pub abandoned: u64,
}

impl ActuationSnapshot {
    pub fn failed(&self) -> u64 {
        self.failed_engage + self.failed_release
    }
}
