//! Package admission types

use std::time::Instant;

use crate::PackageId;

/// Chute number on the sorting line
pub type ChuteId = u32;

/// A package handed to the engine for sorting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,

    /// Requested destination chute
    pub chute: ChuteId,

    /// When the package passed the admission point; used to backfill the
    /// pulse count for packages admitted late
    pub created_at: Instant,
}

impl Package {
    pub fn new(id: impl Into<PackageId>, chute: ChuteId, created_at: Instant) -> Self {
        Self {
            id: id.into(),
            chute,
            created_at,
        }
    }
}

/// Outcome of admitting one package to the sorting queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Tracked against its chute binding, starting at `seeded_count`
    Tracked { seeded_count: u32 },
    /// Requested chute has no binding; the package falls through to the
    /// error chute and no actuation is scheduled
    Rerouted {
        requested: ChuteId,
        error_chute: ChuteId,
    },
    /// The engine is shutting down; nothing was scheduled
    Refused,
}

impl Admission {
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked { .. })
    }
}
