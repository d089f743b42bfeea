//! # kb - Kanban board client
//!
//! A command-line and terminal client for a REST task service, built on the
//! `kanban_board` engine.
//!
//! ## Key Features
//!
//! - **Three-column board**: To Do, In Progress and Done, filtered by search text,
//!   priority, assignee, type and tag
//! - **Optimistic edits**: changes show at once and roll back if the server refuses them
//! - **Keyboard drag and drop**: pick a card up, carry it across columns, drop it
//! - **Undoable deletes** within a short grace window
//! - **Dependencies, subtasks and links** managed from the CLI or the board
//!
//! ## Quick Start
//!
//! ```bash
//! # Open the board
//! kb ui
//!
//! # Add a task
//! kb add "Take out recycling" --priority high --type chore --due tomorrow
//!
//! # Move it, as if dragged onto the In Progress column
//! kb move "Take out recycling" in-progress
//!
//! # List urgent tasks
//! kb list --priority urgent
//! ```
//!
//! Settings live in `~/.kb/config.json`; `--api-url` or `KB_API_URL` override the
//! server address. The board writes its log to `~/.kb/kb.log`.

use std::fs::{self, OpenOptions};
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kanban_board::api::HttpGateway;
use kanban_board::config::{self, BoardConfig};
use kanban_board::drag::DragEngine;
use kanban_board::store::TaskStore;

mod cli;
mod cmd;
mod format;
mod tui {
    pub mod board;
    pub mod board_run;
    pub mod colors;
    pub mod enums;
    pub mod input;
}

use cli::Cli;
use cmd::*;

fn log_filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(d) => EnvFilter::new(d),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Log to stderr, or to `~/.kb/kb.log` while the board owns the terminal.
fn init_logging(directive: Option<&str>, to_file: bool) {
    let filter = log_filter(directive);
    if to_file {
        let dir = config::app_dir();
        let opened = fs::create_dir_all(&dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("kb.log"))
        });
        match opened {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: could not open log file: {e}. Logging is off.");
                tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::new("off"))
                    .init();
                return;
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return;
    }

    init_logging(cli.log_level.as_deref(), matches!(cli.command, Commands::Ui));

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = match BoardConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };
    if let Some(url) = cli.api_url.as_deref() {
        config = config.with_api_base(url);
    }
    if cli.timeout.is_some() {
        config = config.with_timeout_secs(cli.timeout);
    }
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let gateway = match HttpGateway::new(&config) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("Failed to create HTTP client: {e}");
            std::process::exit(1);
        }
    };
    let store = TaskStore::new(Arc::new(gateway), &config);
    let drag = DragEngine::new(store.clone(), &config);

    match cli.command {
        Commands::Ui => cmd_ui(&store, &drag).await,

        Commands::List { status, priority, assignee, sort_by, sort_order, search, tags, task_type, limit } =>
            cmd_list(&store, status, priority, assignee, sort_by, sort_order, search, tags, task_type, limit).await,

        Commands::View { id } => cmd_view(&store, id).await,

        Commands::Add {
            title, status, priority, task_type, tags, due, desc, assignee,
            failure_cost, subtasks, blocked_by, blocking,
        } => cmd_add(&store, title, status, priority, task_type, tags, due, desc, assignee,
                     failure_cost, subtasks, blocked_by, blocking).await,

        Commands::Update {
            id, title, desc, status, priority, task_type, due, assignee,
            add_tags, rm_tags, clear_desc, clear_due, unassign,
        } => cmd_update(&store, id, title, desc, status, priority, task_type, due, assignee,
                        add_tags, rm_tags, clear_desc, clear_due, unassign).await,

        Commands::Move { id, status, position } => cmd_move(&store, &drag, id, status, position).await,

        Commands::Delete { id } => cmd_delete(&store, id).await,

        Commands::Dep { action } => cmd_dep(&store, action).await,

        Commands::Subtask { action } => cmd_subtask(&store, action).await,

        Commands::Link { action } => cmd_link(&store, action).await,

        Commands::Tags => cmd_tags(&store).await,

        Commands::Assignees => cmd_assignees(&store).await,

        Commands::Users => cmd_users(&store).await,

        Commands::Health => cmd_health(&store).await,

        Commands::Completions { .. } => unreachable!("completions handled above"),
    }
}
