//! # Contracts
//!
//! Frozen interface contracts shared by every sorter crate: data model,
//! hardware wire protocol, error taxonomy and the reporting sink trait.
//! Business crates depend on this crate only; reverse dependencies are
//! prohibited.
//!
//! ## Time Model
//! - All engine timestamps are monotonic `std::time::Instant`s; callers
//!   obtain them from the runtime clock so tests can pause time.
//! - Wall-clock `chrono` timestamps appear only in outbound reports.

mod binding;
mod blueprint;
mod error;
mod link;
mod package;
mod package_id;
mod protocol;
mod pulse;
mod report;
mod sink;

pub use binding::*;
pub use blueprint::*;
pub use error::*;
pub use link::*;
pub use package::*;
pub use package_id::PackageId;
pub use protocol::*;
pub use pulse::*;
pub use report::*;
pub use sink::*;
