//! Chute -> module bindings

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::{ChuteId, LinkAddress};

/// Physical wiring and timing of one chute
#[derive(Debug, Clone, PartialEq)]
pub struct ChuteBinding {
    pub chute: ChuteId,

    /// Actuator module that drives this chute's plate
    pub module: LinkAddress,

    /// Output pin on the module
    pub pin: u16,

    /// Trigger pulses between admission and the chute
    pub pulse_distance: u32,

    /// Fraction of the current interval to wait after the releasing pulse
    pub delay_factor: f64,

    /// How long the plate magnet stays engaged
    pub magnet_hold: Duration,
}

/// Read-mostly routing table
///
/// Replaced wholesale on configuration change; never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: HashMap<ChuteId, ChuteBinding>,
    error_chute: ChuteId,
}

impl BindingTable {
    pub fn new(bindings: impl IntoIterator<Item = ChuteBinding>, error_chute: ChuteId) -> Self {
        Self {
            bindings: bindings.into_iter().map(|b| (b.chute, b)).collect(),
            error_chute,
        }
    }

    pub fn resolve(&self, chute: ChuteId) -> Option<&ChuteBinding> {
        self.bindings.get(&chute)
    }

    pub fn error_chute(&self) -> ChuteId {
        self.error_chute
    }

    /// Distinct module links the table needs
    pub fn module_addresses(&self) -> HashSet<LinkAddress> {
        self.bindings.values().map(|b| b.module.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChuteBinding> {
        self.bindings.values()
    }
}
