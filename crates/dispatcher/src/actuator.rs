//! ActuatorDispatcher - timed engage/release sequences per ready package
//!
//! Every package gets its own task: wait `interval × delay_factor` after
//! the releasing pulse, engage the pin, hold, release, then report. A
//! failure ends only that package's sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use contracts::{ActuatorCommand, ContractError, PulseEvent, PulseKind, SortOutcome, SortReport};
use link::{Connector, LinkPool, SystemConnector};
use sorting_queue::PackageTracker;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::{ActuationMetrics, FailureStage};
use crate::reporter::Reporter;

/// Wait between the releasing pulse and engaging the magnet
///
/// A factor that is not finite engages immediately.
pub fn actuation_delay(interval: Duration, delay_factor: f64) -> Duration {
    if !delay_factor.is_finite() {
        warn!(delay_factor, "delay factor is not finite, engaging without delay");
        return Duration::ZERO;
    }
    interval.mul_f64(delay_factor.clamp(0.0, 1.0))
}

/// Result of a bounded shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Sequences that finished within the grace period
    pub completed: usize,
    /// Sequences aborted when the grace period ran out
    pub abandoned: usize,
}

/// Actuator Dispatcher
pub struct ActuatorDispatcher<C: Connector = SystemConnector> {
    links: Arc<LinkPool<C>>,
    reporter: Arc<Reporter>,
    tasks: Mutex<JoinSet<()>>,
    metrics: Arc<ActuationMetrics>,
    closed: AtomicBool,
}

impl<C: Connector> ActuatorDispatcher<C> {
    pub fn new(links: Arc<LinkPool<C>>, reporter: Arc<Reporter>) -> Self {
        Self {
            links,
            reporter,
            tasks: Mutex::new(JoinSet::new()),
            metrics: Arc::new(ActuationMetrics::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn metrics(&self) -> &Arc<ActuationMetrics> {
        &self.metrics
    }

    /// Sequences not yet reaped
    pub fn in_flight(&self) -> usize {
        self.tasks().len()
    }

    /// Start the actuation sequence for a tracker that reached its chute
    ///
    /// Returns immediately. Returns false once the dispatcher is shut down.
    pub fn dispatch(&self, tracker: PackageTracker, interval: Duration, event: &PulseEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            warn!(package = %tracker.package, "dispatcher closed, package not actuated");
            return false;
        }

        let delay = actuation_delay(interval, tracker.binding.delay_factor);
        let deadline = Instant::from_std(event.timestamp + delay);
        let sequence = Sequence {
            links: Arc::clone(&self.links),
            reporter: Arc::clone(&self.reporter),
            metrics: Arc::clone(&self.metrics),
            tracker,
            delay,
            deadline,
            trigger_kind: event.kind,
        };

        self.metrics.record_started();
        let mut tasks = self.tasks();
        while let Some(done) = tasks.try_join_next() {
            log_join_result(done);
        }
        tasks.spawn(sequence.run());
        metrics::gauge!("sorter_actuations_in_flight").set(tasks.len() as f64);
        true
    }

    /// Stop accepting packages and wait up to `grace` for running sequences
    ///
    /// Whatever is still running afterwards is aborted.
    #[instrument(name = "dispatcher_shutdown", skip(self), fields(grace_ms = grace.as_millis() as u64))]
    pub async fn shutdown(&self, grace: Duration) -> ShutdownSummary {
        self.closed.store(true, Ordering::Release);
        let mut tasks = std::mem::take(&mut *self.tasks());
        let mut summary = ShutdownSummary::default();

        let drained = tokio::time::timeout(grace, async {
            while let Some(done) = tasks.join_next().await {
                log_join_result(done);
                summary.completed += 1;
            }
        })
        .await;

        if drained.is_err() {
            summary.abandoned = tasks.len();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            self.metrics.record_abandoned(summary.abandoned as u64);
            warn!(
                abandoned = summary.abandoned,
                "grace period elapsed, actuations abandoned"
            );
        }

        metrics::gauge!("sorter_actuations_in_flight").set(0.0);
        info!(completed = summary.completed, "dispatcher shut down");
        summary
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "actuation task panicked");
        }
    }
}

/// One package's engage/hold/release run
struct Sequence<C: Connector> {
    links: Arc<LinkPool<C>>,
    reporter: Arc<Reporter>,
    metrics: Arc<ActuationMetrics>,
    tracker: PackageTracker,
    delay: Duration,
    deadline: Instant,
    trigger_kind: PulseKind,
}

impl<C: Connector> Sequence<C> {
    #[instrument(
        name = "dispatcher_actuate",
        skip(self),
        fields(
            package = %self.tracker.package,
            chute = self.tracker.binding.chute,
            module = %self.tracker.binding.module,
            pin = self.tracker.binding.pin
        )
    )]
    async fn run(self) {
        sleep_until(self.deadline).await;

        let binding = &self.tracker.binding;
        if let Err(e) = self
            .links
            .send(&binding.module, &ActuatorCommand::engage(binding.pin).encode())
            .await
        {
            self.fail(FailureStage::Engage, e.to_string());
            return;
        }
        let engaged_at = Utc::now();
        debug!("magnet engaged");

        sleep(binding.magnet_hold).await;

        if let Err(e) = self
            .links
            .send(&binding.module, &ActuatorCommand::release(binding.pin).encode())
            .await
        {
            self.fail(FailureStage::Release, e.to_string());
            return;
        }
        let released_at = Utc::now();
        self.metrics.record_succeeded();

        let report = SortReport {
            package: self.tracker.package.clone(),
            outcome: SortOutcome {
                chute: binding.chute,
                module: binding.module.to_string(),
                pin: binding.pin,
                engaged_at,
                released_at,
                delay_ms: self.delay.as_millis() as u64,
                trigger_kind: self.trigger_kind,
            },
        };
        let accepted = self.reporter.report(report);
        debug!(sinks = accepted, "package actuated");
    }

    fn fail(&self, stage: FailureStage, message: String) {
        self.metrics.record_failed(stage);
        let err = ContractError::actuation_failure(
            self.tracker.package.clone(),
            self.tracker.binding.chute,
            message,
        );
        error!(stage = stage.as_str(), error = %err, "actuation aborted");
    }
}
