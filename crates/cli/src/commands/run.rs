//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use super::load_blueprint;
use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;

    if let Some(ref trigger) = args.trigger {
        info!(trigger = %trigger, "Overriding trigger address from CLI");
        blueprint.trigger.address = trigger.clone();
    }
    if let Some(ref listen) = args.listen {
        info!(listen = %listen, "Overriding admission listener from CLI");
        blueprint.admission_listen = Some(listen.clone());
    }
    if args.trigger.is_some() {
        config_loader::ConfigLoader::validate(&blueprint)
            .context("Configuration invalid after CLI overrides")?;
    }

    info!(
        trigger = %blueprint.trigger.address,
        chutes = blueprint.chutes.len(),
        modules = blueprint.module_addresses().len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        stats_interval: (args.stats_interval > 0)
            .then(|| Duration::from_secs(args.stats_interval)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting sorting engine...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Sorting engine failed")?;

    stats.print_summary();
    info!("Sorter finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::SorterBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Trigger: {} (channel {})", blueprint.trigger.address, blueprint.trigger.channel);
    println!("Default interval: {} ms", blueprint.timing.default_interval_ms);
    println!("Error chute: {}", blueprint.error_chute);

    println!("\nChutes ({}):", blueprint.chutes.len());
    for chute in &blueprint.chutes {
        println!(
            "  - {:>3} -> {} pin {} (distance {}, delay x{:.2}, hold {} ms)",
            chute.chute,
            chute.module,
            chute.pin,
            chute.pulse_distance,
            chute.delay_factor,
            chute.magnet_hold_ms
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    if let Some(ref listen) = blueprint.admission_listen {
        println!("\nAdmission listener: {}", listen);
    }

    println!();
}
