//! Signal Interpreter
//!
//! Two-state machine over HIGH/LOW symbols. Every package pass produces
//! HIGH then LOW; a LOW arriving while a LOW is already pending means the
//! HIGH in between was lost, and the pass is placed at the midpoint of the
//! two LOWs. Two consecutive lost HIGHs are not recoverable and yield one
//! event for two passes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{parse_trigger_line, PulseEvent, TriggerLevel};
use tracing::{debug, trace};

use crate::metrics::TriggerMetrics;

/// Samples above `default_interval × SAMPLE_LIMIT_FACTOR` are discarded
pub const SAMPLE_LIMIT_FACTOR: u32 = 5;

/// Interpreter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    Idle,
    /// One LOW seen since the last event
    AwaitingSecondLow { first_low: Instant },
}

/// Interval estimate readable from other tasks
#[derive(Debug, Clone)]
pub struct SharedInterval(Arc<AtomicU64>);

impl SharedInterval {
    fn new(initial: Duration) -> Self {
        Self(Arc::new(AtomicU64::new(initial.as_nanos() as u64)))
    }

    pub fn get(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::Acquire))
    }

    fn set(&self, interval: Duration) {
        self.0.store(interval.as_nanos() as u64, Ordering::Release);
    }
}

/// Signal Interpreter
pub struct SignalInterpreter {
    channel: u8,
    default_interval: Duration,
    interval: SharedInterval,
    state: InterpreterState,
    /// Timestamp of the last emitted event
    last_trigger: Option<Instant>,
    metrics: Arc<TriggerMetrics>,
}

impl SignalInterpreter {
    pub fn new(channel: u8, default_interval: Duration) -> Self {
        Self {
            channel,
            default_interval,
            interval: SharedInterval::new(default_interval),
            state: InterpreterState::Idle,
            last_trigger: None,
            metrics: Arc::new(TriggerMetrics::new()),
        }
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    /// Current interval estimate
    pub fn interval(&self) -> Duration {
        self.interval.get()
    }

    pub fn interval_handle(&self) -> SharedInterval {
        self.interval.clone()
    }

    pub fn metrics(&self) -> Arc<TriggerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process one telegram line received at `arrival`
    ///
    /// Telegrams for other channels are ignored without touching state;
    /// unparseable ones reset the machine to `Idle`.
    pub fn process(&mut self, line: &[u8], arrival: Instant) -> Option<PulseEvent> {
        match parse_trigger_line(line, self.channel) {
            Ok(Some(level)) => self.on_symbol(level, arrival),
            Ok(None) => {
                self.metrics.record_ignored();
                None
            }
            Err(e) => {
                debug!(error = %e, "discarding trigger frame");
                self.on_malformed();
                None
            }
        }
    }

    /// Reset after a frame that could not be interpreted
    pub fn on_malformed(&mut self) {
        self.metrics.record_malformed();
        self.state = InterpreterState::Idle;
    }

    /// Forget the pending LOW and the last trigger after the sensor link
    /// went down; the interval estimate is kept
    pub fn reset(&mut self) {
        self.state = InterpreterState::Idle;
        self.last_trigger = None;
    }

    pub fn on_symbol(&mut self, level: TriggerLevel, arrival: Instant) -> Option<PulseEvent> {
        match (level, self.state) {
            (TriggerLevel::High, _) => {
                self.state = InterpreterState::Idle;
                self.metrics.record_real();
                Some(self.emit(PulseEvent::real(arrival)))
            }
            (TriggerLevel::Low, InterpreterState::Idle) => {
                self.state = InterpreterState::AwaitingSecondLow { first_low: arrival };
                None
            }
            // a duplicated LOW telegram cannot be told apart from a lost HIGH
            // and compensates as well
            (TriggerLevel::Low, InterpreterState::AwaitingSecondLow { first_low }) => {
                self.state = InterpreterState::Idle;
                let half = arrival.saturating_duration_since(first_low) / 2;
                self.metrics.record_compensated();
                debug!(?half, "lost HIGH compensated");
                Some(self.emit(PulseEvent::compensated(first_low + half)))
            }
        }
    }

    /// Update the interval estimate from `event` and remember it as the last trigger
    fn emit(&mut self, mut event: PulseEvent) -> PulseEvent {
        if let Some(last) = self.last_trigger {
            match event.timestamp.checked_duration_since(last) {
                Some(sample) if self.accept_sample(sample) => {
                    self.interval.set(sample);
                    event.interval_sample = Some(sample);
                }
                sample => {
                    trace!(?sample, "interval sample rejected");
                    self.metrics.record_rejected_sample();
                }
            }
        }
        self.last_trigger = Some(event.timestamp);
        event
    }

    fn accept_sample(&self, sample: Duration) -> bool {
        !sample.is_zero() && sample <= self.default_interval * SAMPLE_LIMIT_FACTOR
    }
}
