//! ReportSink trait - Dispatcher output interface

use crate::{ContractError, SortReport};

/// Report output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(ReportSink: Send)]
pub trait LocalReportSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one sort report
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn report(&mut self, report: &SortReport) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
