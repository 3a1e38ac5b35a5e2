//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::LinkAddress;
use std::path::PathBuf;

/// Sorter - plate-turnover package sorting engine
#[derive(Parser, Debug)]
#[command(
    name = "sorter",
    author,
    version,
    about = "Plate-turnover package sorting engine",
    long_about = "Drives a plate-turnover sorting line.\n\n\
                  Reads photoelectric trigger telegrams, tracks every admitted package \n\
                  by pulse count, and fires the chute actuators when a package arrives."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SORTER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SORTER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sorting engine
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "sorter.toml", env = "SORTER_CONFIG")]
    pub config: PathBuf,

    /// Override the trigger sensor address (tcp://host:port or serial://port@baud)
    #[arg(long, env = "SORTER_TRIGGER")]
    pub trigger: Option<LinkAddress>,

    /// Override the package admission listen address
    #[arg(long, env = "SORTER_LISTEN")]
    pub listen: Option<String>,

    /// Stop after this many seconds (0 = run until signalled)
    #[arg(long, default_value = "0", env = "SORTER_TIMEOUT")]
    pub timeout: u64,

    /// Log engine statistics every N seconds (0 = disabled)
    #[arg(long, default_value = "30", env = "SORTER_STATS_INTERVAL")]
    pub stats_interval: u64,

    /// Validate configuration and exit without starting the engine
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "SORTER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sorter.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sorter.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show every chute binding
    #[arg(long)]
    pub chutes: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
