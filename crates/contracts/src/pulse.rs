//! PulseEvent - Signal Interpreter output

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How a trigger event was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseKind {
    /// Observed HIGH edge
    Real,
    /// Synthesized from two consecutive LOWs after a lost HIGH
    Compensated,
}

/// One package pass at the trigger sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEvent {
    /// Corrected pass time (midpoint of the two LOWs for compensated events)
    pub timestamp: Instant,

    pub kind: PulseKind,

    /// Accepted interval sample, if this event updated the estimate
    pub interval_sample: Option<Duration>,
}

impl PulseEvent {
    pub fn real(timestamp: Instant) -> Self {
        Self {
            timestamp,
            kind: PulseKind::Real,
            interval_sample: None,
        }
    }

    pub fn compensated(timestamp: Instant) -> Self {
        Self {
            timestamp,
            kind: PulseKind::Compensated,
            interval_sample: None,
        }
    }

    pub fn is_compensated(&self) -> bool {
        self.kind == PulseKind::Compensated
    }
}
