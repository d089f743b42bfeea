use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Kanban board client for a remote task service.
/// Settings are read from ~/.kb/config.json unless --config is given.
#[derive(Parser)]
#[command(name = "kb", version, about = "Drag-and-drop Kanban board client")]
pub struct Cli {
    /// Base URL of the task API, e.g. http://localhost:8001/api.
    #[arg(long, global = true, env = "KB_API_URL")]
    pub api_url: Option<String>,

    /// Path to the JSON config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Request timeout in seconds. No timeout when unset.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Log filter directive, e.g. "debug" or "kanban_board=trace". Overrides RUST_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}
