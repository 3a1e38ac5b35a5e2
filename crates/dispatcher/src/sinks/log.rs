//! LogSink - logs one line per sort report via tracing

use contracts::{ContractError, ReportSink, SortReport};
use tracing::{info, instrument};

/// Sink that logs report summaries
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ReportSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_report",
        skip(self, report),
        fields(sink = %self.name, package = %report.package)
    )]
    async fn report(&mut self, report: &SortReport) -> Result<(), ContractError> {
        let outcome = &report.outcome;
        info!(
            chute = outcome.chute,
            module = %outcome.module,
            pin = outcome.pin,
            delay_ms = outcome.delay_ms,
            trigger = ?outcome.trigger_kind,
            engaged_at = %outcome.engaged_at,
            released_at = %outcome.released_at,
            "package sorted"
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
