//! Clap derive structures for the `ayla` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ayla -- inspect and control Ayla-connected devices
#[derive(Debug, Parser)]
#[command(
    name = "ayla",
    version,
    about = "Inspect and control Ayla IoT devices from the command line",
    long_about = "Lists devices and their properties, writes datapoints and \
        follows live updates through the Ayla device and stream services.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "AYLA_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Access token (overrides profile)
    #[arg(long, env = "AYLA_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Device service URL (overrides profile)
    #[arg(long, env = "AYLA_DEVICE_SERVICE_URL", global = true)]
    pub device_service_url: Option<String>,

    /// Stream subscription service URL (overrides profile)
    #[arg(long, env = "AYLA_STREAM_SERVICE_URL", global = true)]
    pub stream_service_url: Option<String>,

    /// Push socket URL (overrides profile)
    #[arg(long, env = "AYLA_STREAM_SOCKET_URL", global = true)]
    pub stream_socket_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "AYLA_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long, short = 'k', env = "AYLA_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "AYLA_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,

    /// Fall back to the offline cache when the service is unreachable
    #[arg(long, global = true)]
    pub offline: bool,
}

// ── Output, Color & Log Enums ────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices on the account
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Show the properties of one device
    #[command(alias = "props")]
    Properties(PropertiesArgs),

    /// Write a datapoint to a device property
    Set(SetArgs),

    /// Follow device and property changes until interrupted
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Include each device's properties
    #[arg(long)]
    pub properties: bool,

    /// Only show devices with this connection state
    #[arg(long)]
    pub status: Option<StatusFilter>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    Online,
    Offline,
}

#[derive(Debug, Args)]
pub struct PropertiesArgs {
    /// Device serial number
    pub dsn: String,

    /// Only fetch these properties (repeatable)
    #[arg(long = "name", short = 'n')]
    pub names: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Device serial number
    pub dsn: String,

    /// Property name
    pub property: String,

    /// New value; parsed according to the property's base type
    pub value: String,

    /// Seconds to wait for the device to acknowledge (0 returns at once)
    #[arg(long)]
    pub ack_timeout: Option<u64>,

    /// Datapoint metadata as key=value (repeatable)
    #[arg(long = "meta", short = 'm', value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only report changes for these devices (repeatable)
    #[arg(long = "dsn", short = 'd')]
    pub dsns: Vec<String>,

    /// Skip the push channel and rely on polling only
    #[arg(long)]
    pub no_stream: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
