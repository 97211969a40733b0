//! Command-line interface definition using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fleet_models::WorkerState;
use fleet_store::config::{LOCK_TIMEOUT_ENV, STATE_DIR_ENV};
use fleet_store::StoreConfig;

/// Fleet - shared state for cooperating worker processes
#[derive(Parser, Debug)]
#[command(name = "fleet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = STATE_DIR_ENV, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Owner id used for locks (default: cli-<pid>)
    #[arg(long, env = "FLEET_OWNER", global = true)]
    pub owner: Option<String>,

    /// Age in milliseconds after which a lock is considered abandoned
    #[arg(long, env = LOCK_TIMEOUT_ENV, global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Retry this many times when a document is locked by someone else
    #[arg(long, default_value_t = 0, global = true)]
    pub retries: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a document
    Get {
        name: String,

        /// Also report whether the value was repaired or restored
        #[arg(long)]
        source: bool,
    },

    /// Replace a document with a JSON value
    Set { name: String, json: String },

    /// Set one top-level key of a document to a JSON value
    Patch {
        name: String,
        key: String,
        json: String,
    },

    /// Take the lock on a document and print its lock id
    Lock { name: String },

    /// Release a lock taken with `lock`
    Unlock { name: String, lock_id: String },

    /// Show who holds the lock on a document
    LockStatus { name: String },

    /// List snapshots of a document, newest first
    Backups { name: String },

    /// Task list commands
    #[command(subcommand)]
    Task(TaskCommand),

    /// Worker status commands
    #[command(subcommand)]
    Worker(WorkerCommand),

    /// Project configuration commands
    #[command(subcommand)]
    Project(ProjectCommand),
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a pending task
    Add { title: String },

    /// List tasks
    List {
        /// Show only pending tasks
        #[arg(short, long)]
        pending: bool,
    },

    /// Claim a pending task
    Claim {
        /// Task id or unique prefix
        id: String,

        /// Worker to assign (default: the owner id)
        #[arg(short, long)]
        worker: Option<String>,
    },

    /// Mark a task completed
    Done {
        /// Task id or unique prefix
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Report a worker's status
    Set {
        worker: String,
        state: WorkerState,

        /// Task the worker is on
        #[arg(short, long)]
        task: Option<String>,

        /// Progress note
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show all workers
    Show,

    /// Remove a worker from the board
    Remove { worker: String },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Print the project configuration
    Show,

    /// Set a setting; values that are not JSON are stored as strings
    Set { key: String, value: String },

    /// Remove a setting
    Unset { key: String },
}

impl Cli {
    /// Store configuration from the environment, overridden by flags.
    pub fn store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::from_env();
        if let Some(dir) = &self.state_dir {
            config.root = dir.clone();
        }
        if let Some(ms) = self.lock_timeout_ms {
            config.lock_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Returns the owner id, defaulting to one unique to this process.
    pub fn owner(&self) -> String {
        self.owner
            .clone()
            .unwrap_or_else(|| format!("cli-{}", std::process::id()))
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
