//! CLI argument parsing for pinstream
//!
//! Uses clap derive with subcommands: `watch`, `connections`, `prune`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::default_db_path;

/// Live pin map client and registry tools
#[derive(Parser, Debug)]
#[command(name = "pinstream")]
#[command(about = "Follow a live pin map and manage the push connection registry")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands for pinstream
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Hydrate from the pin API and follow pushed changes until Ctrl-C
    Watch(WatchArgs),

    /// List registered push connections
    Connections(RegistryArgs),

    /// Remove connections from the registry
    Prune(PruneArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Base URL of the pin API (the collection lives at `<url>pin`)
    #[arg(long, env = "PINSTREAM_API_URL")]
    pub api_url: String,

    /// WebSocket URL of the push daemon
    #[arg(long, env = "PINSTREAM_WS_URL")]
    pub ws_url: String,

    /// First reconnect delay in milliseconds
    #[arg(long, default_value = "250")]
    pub reconnect_ms: u64,

    /// Longest reconnect delay in milliseconds
    #[arg(long, default_value = "30000")]
    pub max_reconnect_ms: u64,

    /// Seconds between cache summaries
    #[arg(long, default_value = "10")]
    pub report_secs: u64,

    /// Seconds to wait for the daemon to register this session
    #[arg(long, default_value = "30")]
    pub register_timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// Connection registry database
    #[arg(long, env = "PINSTREAM_DB", default_value_os_t = default_db_path())]
    pub db: PathBuf,
}

#[derive(Args, Debug)]
pub struct PruneArgs {
    #[command(flatten)]
    pub registry: RegistryArgs,

    /// Connection ids to remove
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}
