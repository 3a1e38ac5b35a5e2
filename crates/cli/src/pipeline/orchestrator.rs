//! Engine orchestrator - runs one sorting engine until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::SorterBlueprint;
use link::SystemConnector;
use sort_engine::SortingEngine;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{admission, PipelineStats};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: SorterBlueprint,

    /// Stop after this long (None = run until signalled)
    pub timeout: Option<Duration>,

    /// Periodic stats logging (None = disabled)
    pub stats_interval: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the engine until `shutdown` resolves or the timeout elapses
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - sort reports will be discarded");
        }

        let engine = Arc::new(
            SortingEngine::start(blueprint, Arc::new(SystemConnector))
                .await
                .context("Failed to start sorting engine")?,
        );

        let admission_task = match blueprint.admission_listen.as_deref() {
            Some(addr) => Some(self.start_admission(addr, &engine).await?),
            None => {
                warn!("No admission listener configured");
                None
            }
        };

        info!(
            links = engine.link_states().len(),
            interval_ms = engine.interval().as_millis() as u64,
            "Sorting engine running"
        );

        let timeout = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = shutdown => {}
            _ = timeout => info!("Run timeout reached"),
            _ = log_stats_periodically(&engine, self.config.stats_interval) => {}
        }

        info!("Shutting down sorting engine...");
        if let Some(task) = admission_task {
            task.abort();
        }
        let summary = engine.shutdown().await;

        let stats = PipelineStats::new(engine.stats(), summary, start_time.elapsed());
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            sorted = stats.engine.actuation.succeeded,
            abandoned = stats.shutdown.abandoned,
            "Sorting engine shutdown complete"
        );
        Ok(stats)
    }

    async fn start_admission(
        &self,
        addr: &str,
        engine: &Arc<SortingEngine>,
    ) -> Result<JoinHandle<()>> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind admission listener on {}", addr))?;
        info!(addr, "Accepting packages");
        Ok(tokio::spawn(admission::serve(listener, Arc::clone(engine))))
    }
}

async fn log_stats_periodically(engine: &SortingEngine, every: Option<Duration>) {
    let Some(every) = every else {
        return std::future::pending().await;
    };
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let stats = engine.stats();
        let connected = stats.links.values().filter(|s| s.is_connected()).count();
        info!(
            interval_ms = stats.interval.as_millis() as u64,
            in_flight = stats.queue.in_flight,
            admitted = stats.queue.admitted,
            rerouted = stats.queue.rerouted,
            sorted = stats.actuation.succeeded,
            failed = stats.actuation.failed(),
            links_connected = connected,
            links_total = stats.links.len(),
            "engine stats"
        );
    }
}
