//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::{CompressionMode, PipelineConfig};

/// Telemetry Buffer - capture, buffer and upload sensor telemetry
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-buffer",
    author,
    version,
    about = "Durable telemetry capture, buffering and upload",
    long_about = "Reads sensor samples as JSON lines, fans them out to a durable rotating\n\
                  segment log, and uploads sealed segments to a collector with resumable,\n\
                  retrying batches."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_VERBOSE")]
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
        env = "TELEMETRY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture samples from stdin (or a file) into the segment log
    Run(RunArgs),

    /// Upload every stored segment once and exit
    Upload(UploadArgs),

    /// Probe the collector
    Ping(PingArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and stored segments
    Info(InfoArgs),
}

/// Configuration file plus command-line overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TELEMETRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the segment directory
    #[arg(long, env = "TELEMETRY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the compression mode of new segments
    #[arg(long, value_enum)]
    pub compression: Option<CompressionArg>,

    /// Override the user id attached to records and segment names
    #[arg(long, env = "TELEMETRY_USER_ID")]
    pub user_id: Option<String>,

    /// Override the collector base URL
    #[arg(long, env = "TELEMETRY_UPLOAD_URL")]
    pub url: Option<String>,
}

impl ConfigArgs {
    /// Apply the overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.storage.dir = dir.clone();
        }
        if let Some(compression) = self.compression {
            config.storage.compression = compression.into();
        }
        if let Some(user_id) = &self.user_id {
            config.identity.user_id = user_id.clone();
        }
        if let Some(url) = &self.url {
            config.upload.base_url = Some(url.clone());
        }
    }
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Read samples from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Upload pending segments every N seconds (0 = only when the run ends)
    #[arg(long, default_value = "0", env = "TELEMETRY_UPLOAD_INTERVAL")]
    pub upload_interval: u64,

    /// Skip the final upload when the run ends
    #[arg(long)]
    pub no_final_upload: bool,

    /// Stop after this many records (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_records: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TELEMETRY_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TELEMETRY_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `upload` command
#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output the batch outcome as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `ping` command
#[derive(Args, Debug, Clone)]
pub struct PingArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Collector host (IPv4 or localhost); takes precedence over the configured URL
    #[arg(long, requires = "port")]
    pub host: Option<String>,

    /// Collector port
    #[arg(long)]
    pub port: Option<u32>,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "telemetry.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List stored segment files
    #[arg(long)]
    pub segments: bool,
}

/// Compression mode accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CompressionArg {
    Plain,
    Gzip,
}

impl From<CompressionArg> for CompressionMode {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Plain => CompressionMode::Plain,
            CompressionArg::Gzip => CompressionMode::Gzip,
        }
    }
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
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
