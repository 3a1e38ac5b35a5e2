//! Run statistics.

use std::time::Duration;

use sort_engine::{EngineStats, ShutdownSummary};

/// Statistics from one engine run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub engine: EngineStats,
    pub shutdown: ShutdownSummary,
    pub duration: Duration,
}

impl PipelineStats {
    pub fn new(engine: EngineStats, shutdown: ShutdownSummary, duration: Duration) -> Self {
        Self {
            engine,
            shutdown,
            duration,
        }
    }

    /// Sorted packages per minute
    pub fn throughput(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.engine.actuation.succeeded as f64 / minutes
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        let queue = &self.engine.queue;
        let actuation = &self.engine.actuation;

        println!("\n=== Sorter Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Admitted: {}", queue.admitted);
        println!("   ├─ Rerouted to error chute: {}", queue.rerouted);
        println!("   ├─ Still in flight: {}", queue.in_flight);
        println!("   └─ Throughput: {:.1} packages/min", self.throughput());

        println!("\nActuation");
        println!("   ├─ Started: {}", actuation.started);
        println!("   ├─ Succeeded: {}", actuation.succeeded);
        println!("   ├─ Failed at engage: {}", actuation.failed_engage);
        println!("   ├─ Failed at release: {}", actuation.failed_release);
        println!("   └─ Abandoned at shutdown: {}", self.shutdown.abandoned);

        println!("\n{}", self.engine.pulses);
        println!(
            "Malformed telegrams: {}, rejected interval samples: {}",
            self.engine.trigger.malformed_frames, self.engine.trigger.rejected_samples
        );

        if !self.engine.sinks.is_empty() {
            println!("\nSinks");
            for (name, metrics) in &self.engine.sinks {
                println!(
                    "   ├─ {}: {} delivered, {} failed, {} dropped",
                    name, metrics.report_count, metrics.failure_count, metrics.dropped_count
                );
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn engine_stats(succeeded: u64) -> EngineStats {
        EngineStats {
            uptime: Duration::from_secs(60),
            interval: Duration::from_millis(500),
            queue: Default::default(),
            trigger: Default::default(),
            actuation: sort_engine::ActuationSnapshot {
                succeeded,
                ..Default::default()
            },
            sinks: Vec::new(),
            links: HashMap::new(),
            pulses: Default::default(),
        }
    }

    #[test]
    fn test_throughput_per_minute() {
        let stats = PipelineStats::new(
            engine_stats(90),
            ShutdownSummary::default(),
            Duration::from_secs(30),
        );
        assert!((stats.throughput() - 180.0).abs() < 1e-9);

        let idle = PipelineStats::new(engine_stats(5), ShutdownSummary::default(), Duration::ZERO);
        assert_eq!(idle.throughput(), 0.0);
    }
}
