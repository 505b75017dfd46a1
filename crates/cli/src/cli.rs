//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// North Bridge - host for north delivery plugins
#[derive(Parser, Debug)]
#[command(
    name = "north-bridge",
    author,
    version,
    about = "Host north delivery plugins and feed them readings",
    long_about = "Loads a north plugin shared library, drives it through its lifecycle \n\
                  and delivers readings ingested from a foreign filter stage.\n\n\
                  Persisting plugins resume from the state saved by the previous run."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "NORTH_BRIDGE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "NORTH_BRIDGE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level used when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the plugin and deliver readings
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and plugin information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "north.toml", env = "NORTH_BRIDGE_CONFIG")]
    pub config: PathBuf,

    /// Override the plugin library from configuration
    #[arg(long, env = "NORTH_BRIDGE_LIBRARY")]
    pub library: Option<PathBuf>,

    /// JSON file of readings to ingest (array of readings or array of batches)
    #[arg(short, long, env = "NORTH_BRIDGE_INPUT")]
    pub input: Option<PathBuf>,

    /// Readings per batch when the input is a flat array
    #[arg(long, default_value = "100", env = "NORTH_BRIDGE_BATCH_SIZE")]
    pub batch_size: usize,

    /// Capacity of the ingest queue (batches)
    #[arg(long, default_value = "1024", env = "NORTH_BRIDGE_INGEST_BUFFER")]
    pub ingest_buffer: usize,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "NORTH_BRIDGE_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without loading the plugin
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "NORTH_BRIDGE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "north.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "north.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Load the plugin library and report its entry points
    #[arg(long)]
    pub plugin: bool,
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
