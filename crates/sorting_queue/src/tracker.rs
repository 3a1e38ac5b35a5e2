//! Package Tracker

use std::time::Instant;

use contracts::{ChuteBinding, ChuteId, PackageId};

/// One in-flight package
///
/// `count` only grows; the tracker leaves the queue exactly once, on the
/// pulse that makes `count` reach `binding.pulse_distance`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageTracker {
    pub package: PackageId,

    /// Binding resolved at admission; later table changes do not affect it
    pub binding: ChuteBinding,

    /// Pulses counted since admission (including the backfilled seed)
    pub count: u32,

    pub created_at: Instant,

    pub last_pulse_at: Option<Instant>,

    /// Admission order
    pub(crate) seq: u64,
}

impl PackageTracker {
    pub(crate) fn new(
        package: PackageId,
        binding: ChuteBinding,
        count: u32,
        created_at: Instant,
        seq: u64,
    ) -> Self {
        Self {
            package,
            binding,
            count,
            created_at,
            last_pulse_at: None,
            seq,
        }
    }

    pub fn chute(&self) -> ChuteId {
        self.binding.chute
    }

    /// Pulses still to come
    pub fn remaining(&self) -> u32 {
        self.binding.pulse_distance.saturating_sub(self.count)
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.binding.pulse_distance
    }

    pub(crate) fn advance(&mut self, at: Instant) {
        self.count = self.count.saturating_add(1);
        self.last_pulse_at = Some(at);
    }
}
