//! # Trigger
//!
//! Photoelectric trigger signal processing.
//!
//! Responsibilities:
//! - Reassemble sensor telegrams from arbitrary transport chunks
//! - Turn HIGH/LOW symbols into one pulse event per package pass
//! - Compensate a single lost HIGH from two consecutive LOWs
//! - Maintain the inter-package interval estimate
//! - Hand events to the sorting core in arrival order
//!
//! ## Usage Example
//!
//! ```ignore
//! use trigger::{SignalInterpreter, TriggerPipeline};
//!
//! let interpreter = SignalInterpreter::new(1, Duration::from_millis(500));
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! trigger_link.set_consumer(tx);
//! let pipeline = TriggerPipeline::spawn(interpreter, rx, |event, interval| {
//!     queue.on_pulse(&event);
//! });
//! ```

mod error;
mod framer;
mod interpreter;
mod metrics;
mod pipeline;

pub use error::{Result, TriggerError};
pub use framer::{LineFramer, DEFAULT_MAX_LINE_LEN};
pub use interpreter::{InterpreterState, SharedInterval, SignalInterpreter, SAMPLE_LIMIT_FACTOR};
pub use metrics::{TriggerMetrics, TriggerMetricsSnapshot};
pub use pipeline::{PulseHandler, TriggerPipeline};
