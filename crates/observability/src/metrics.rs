//! 分拣线指标记录与运行统计
//!
//! 组件各自用 `metrics` 宏记录自身计数；本模块负责跨组件的指标
//! (节拍、链路状态) 以及进程内摘要。

use std::time::Duration;

use contracts::{LinkEvent, PulseEvent, PulseKind};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// 注册全部 `sorter_` 指标的说明
pub fn describe_metrics() {
    describe_counter!("sorter_pulse_events_total", "Trigger pulse events by kind");
    describe_counter!(
        "sorter_trigger_malformed_frames_total",
        "Trigger telegrams that could not be parsed"
    );
    describe_counter!(
        "sorter_interval_samples_rejected_total",
        "Interval samples outside (0, 5 x default]"
    );
    describe_gauge!(
        "sorter_interval_estimate_ms",
        Unit::Milliseconds,
        "Current inter-package interval estimate"
    );
    describe_histogram!(
        "sorter_interval_sample_ms",
        Unit::Milliseconds,
        "Accepted interval samples"
    );
    describe_counter!("sorter_packages_admitted_total", "Admissions by result");
    describe_counter!("sorter_packages_released_total", "Trackers that reached their chute");
    describe_gauge!("sorter_queue_depth", "Packages in flight");
    describe_counter!("sorter_actuations_total", "Actuation sequences by result");
    describe_gauge!("sorter_actuations_in_flight", "Actuation tasks not yet reaped");
    describe_counter!("sorter_reports_dropped_total", "Reports dropped by a full sink queue");
    describe_gauge!("sorter_link_connected", "1 while the link is connected");
    describe_counter!("sorter_link_lost_total", "Unexpected transport losses");
    describe_counter!(
        "sorter_link_reconnect_attempts_total",
        "Reconnect attempts made by supervisors"
    );
}

/// 记录一个脉冲事件及其后的节拍估计
pub fn record_pulse(event: &PulseEvent, interval: Duration) {
    gauge!("sorter_interval_estimate_ms").set(interval.as_secs_f64() * 1000.0);
    if let Some(sample) = event.interval_sample {
        histogram!("sorter_interval_sample_ms").record(sample.as_secs_f64() * 1000.0);
    }
}

/// 记录单个脉冲上到位的包裹数
pub fn record_released(count: usize) {
    if count > 0 {
        counter!("sorter_packages_released_total").increment(count as u64);
    }
}

/// 记录链路状态迁移 (每设备一个连接指示)
pub fn record_link_transition(event: &LinkEvent) {
    let connected = if event.to.is_connected() { 1.0 } else { 0.0 };
    gauge!("sorter_link_connected", "address" => event.address.to_string()).set(connected);
}

/// 脉冲统计聚合器
///
/// 在触发任务内更新，便于关停时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PulseStatsAggregator {
    pub total_pulses: u64,
    pub compensated: u64,
    pub released: u64,
    /// 被接受的节拍样本 (ms)
    pub interval_ms: RunningStats,
}

impl PulseStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &PulseEvent, released: usize) {
        self.total_pulses += 1;
        if event.kind == PulseKind::Compensated {
            self.compensated += 1;
        }
        self.released += released as u64;
        if let Some(sample) = event.interval_sample {
            self.interval_ms.push(sample.as_secs_f64() * 1000.0);
        }
    }

    pub fn summary(&self) -> PulseSummary {
        PulseSummary {
            total_pulses: self.total_pulses,
            compensated: self.compensated,
            released: self.released,
            compensation_rate: if self.total_pulses > 0 {
                self.compensated as f64 / self.total_pulses as f64 * 100.0
            } else {
                0.0
            },
            interval_ms: StatsSummary::from(&self.interval_ms),
        }
    }
}

/// 脉冲摘要
#[derive(Debug, Clone, Default)]
pub struct PulseSummary {
    pub total_pulses: u64,
    pub compensated: u64,
    pub released: u64,
    pub compensation_rate: f64,
    pub interval_ms: StatsSummary,
}

impl std::fmt::Display for PulseSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Trigger Summary ===")?;
        writeln!(f, "Pulses: {}", self.total_pulses)?;
        writeln!(
            f,
            "Compensated: {} ({:.2}%)",
            self.compensated, self.compensation_rate
        )?;
        writeln!(f, "Packages released: {}", self.released)?;
        writeln!(f, "Interval (ms): {}", self.interval_ms)
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计 (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [480.0, 500.0, 520.0] {
            stats.push(v);
        }
        assert_eq!(stats.count(), 3);
        assert!((stats.mean() - 500.0).abs() < 1e-9);
        assert!((stats.variance() - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregator_counts_compensation() {
        let now = Instant::now();
        let mut aggregator = PulseStatsAggregator::new();

        aggregator.update(&PulseEvent::real(now), 0);
        let mut sampled = PulseEvent::compensated(now);
        sampled.interval_sample = Some(Duration::from_millis(500));
        aggregator.update(&sampled, 2);

        let summary = aggregator.summary();
        assert_eq!(summary.total_pulses, 2);
        assert_eq!(summary.compensated, 1);
        assert_eq!(summary.released, 2);
        assert!((summary.compensation_rate - 50.0).abs() < 1e-9);
        assert_eq!(summary.interval_ms.count, 1);
        assert!((summary.interval_ms.mean - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let summary = PulseSummary {
            total_pulses: 200,
            compensated: 4,
            released: 150,
            compensation_rate: 2.0,
            interval_ms: StatsSummary::default(),
        };
        let output = summary.to_string();
        assert!(output.contains("Pulses: 200"));
        assert!(output.contains("2.00%"));
        assert!(output.contains("Interval (ms): N/A"));
    }
}
