//! Sort reports delivered to the reporting sinks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChuteId, PackageId, PulseKind};

/// What happened to one actuated package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOutcome {
    pub chute: ChuteId,

    /// Display form of the module link address
    pub module: String,

    pub pin: u16,

    pub engaged_at: DateTime<Utc>,

    pub released_at: DateTime<Utc>,

    /// Delay applied after the releasing pulse
    pub delay_ms: u64,

    /// Kind of the pulse that released the tracker
    pub trigger_kind: PulseKind,
}

/// One report per successfully actuated package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortReport {
    pub package: PackageId,
    pub outcome: SortOutcome,
}
