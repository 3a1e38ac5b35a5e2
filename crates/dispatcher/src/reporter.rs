//! Reporter - fans sort reports out to every configured sink

use std::sync::{Mutex, PoisonError};

use tracing::{info, instrument};

use contracts::{SinkConfig, SinkType, SortReport};

use crate::error::DispatchError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Fan-out to sink handles
///
/// `report` never blocks: each sink has its own bounded queue and a slow
/// sink only drops its own reports.
pub struct Reporter {
    handles: Mutex<Vec<SinkHandle>>,
}

impl Reporter {
    /// Create every sink named in `configs`
    #[instrument(name = "reporter_build", skip(configs), fields(sink_count = configs.len()))]
    pub async fn build(configs: &[SinkConfig]) -> Result<Self, DispatchError> {
        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            handles.push(create_sink_handle(config).await?);
        }
        info!(sinks = handles.len(), "reporter ready");
        Ok(Self::with_handles(handles))
    }

    /// Create a reporter with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>) -> Self {
        Self {
            handles: Mutex::new(handles),
        }
    }

    /// Queue `report` on every sink; returns how many accepted it
    pub fn report(&self, report: SortReport) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles
            .iter()
            .filter(|handle| handle.try_send(report.clone()))
            .count()
    }

    /// Metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    pub fn sink_count(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drain and close every sink; later reports are discarded
    #[instrument(name = "reporter_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = handles.len();
        for handle in handles {
            handle.shutdown().await;
        }
        info!(sinks = count, "reporter shut down");
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "reporter_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub async fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatchError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatchError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatchError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}
