//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// dualcam - dual-channel frame acquisition engine
#[derive(Parser, Debug)]
#[command(
    name = "dualcam",
    author,
    version,
    about = "Dual-channel frame acquisition and synchronization",
    long_about = "Frame acquisition engine for paired camera streams.\n\n\
                  Validates device configuration, prints the resolved settings and \n\
                  runs live acquisition against the built-in simulated camera pair."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DUALCAM_VERBOSE")]
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
        env = "DUALCAM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run live acquisition against the simulated camera pair
    Simulate(SimulateArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Path to configuration file (TOML or JSON); a simulated pair is used when absent
    #[arg(short, long, env = "DUALCAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Frames generated per channel and requested from the sequence
    #[arg(
        long,
        default_value = "100",
        env = "DUALCAM_FRAMES",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub frames: u64,

    /// Simulated sensor width in pixels
    #[arg(long, default_value = "64")]
    pub width: u32,

    /// Simulated sensor height in pixels
    #[arg(long, default_value = "48")]
    pub height: u32,

    /// Drop every Nth frame from camera 2 (0 = never)
    #[arg(long, default_value = "0")]
    pub drop_every: u64,

    /// Interval hint between frames in milliseconds
    #[arg(long, default_value = "10")]
    pub interval_ms: u64,

    /// Stop the sequence on the first consumer overflow
    #[arg(long)]
    pub stop_on_overflow: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "DUALCAM_METRICS_PORT")]
    pub metrics_port: u16,

    /// Output the session summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "dualcam.toml", env = "DUALCAM_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "dualcam.toml", env = "DUALCAM_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
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
