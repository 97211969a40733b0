//! Store configuration.
//!
//! # Environment Variables
//!
//! - `FLEET_STATE_DIR`: root directory holding documents
//! - `FLEET_LOCK_TIMEOUT_MS`: age after which a lock counts as stale
//! - `FLEET_BACKUP_RETENTION`: snapshots kept per document
//! - `FLEET_RECOVERY_OWNER`: owner id used when recovery persists a fix

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

/// Environment variable for the store root.
pub const STATE_DIR_ENV: &str = "FLEET_STATE_DIR";

/// Environment variable for the lock timeout in milliseconds.
pub const LOCK_TIMEOUT_ENV: &str = "FLEET_LOCK_TIMEOUT_MS";

/// Environment variable for backup retention.
pub const BACKUP_RETENTION_ENV: &str = "FLEET_BACKUP_RETENTION";

/// Environment variable for the recovery owner id.
pub const RECOVERY_OWNER_ENV: &str = "FLEET_RECOVERY_OWNER";

/// Default lock timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of backups kept per document.
pub const DEFAULT_BACKUP_RETENTION: usize = 10;

/// Name of the backup directory under the root.
pub const BACKUP_SUBDIR: &str = ".backups";

/// Default root directory name under home.
const DEFAULT_STATE_DIR: &str = ".fleet";

/// Configuration for a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding documents and lock sidecars.
    pub root: PathBuf,
    /// Age after which another owner may reclaim a lock.
    pub lock_timeout: Duration,
    /// Snapshots kept per document.
    pub backup_retention: usize,
    /// Owner id used when a read persists a repaired or restored document.
    pub recovery_owner: String,
    /// Per-name defaults overriding the built-in ones.
    pub defaults: HashMap<String, Value>,
}

impl StoreConfig {
    /// Creates a configuration rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            backup_retention: DEFAULT_BACKUP_RETENTION,
            recovery_owner: format!("recovery-{}", std::process::id()),
            defaults: HashMap::new(),
        }
    }

    /// Builds a configuration from the environment.
    ///
    /// The root is determined by:
    /// 1. `FLEET_STATE_DIR` if set
    /// 2. `~/.fleet/state` if a home directory is available
    /// 3. `.fleet/state` in the current directory as fallback
    ///
    /// Unparseable numeric variables are logged and ignored.
    pub fn from_env() -> Self {
        let root = std::env::var(STATE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_root());
        let mut config = Self::new(root);

        if let Some(ms) = env_number::<u64>(LOCK_TIMEOUT_ENV) {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_number::<usize>(BACKUP_RETENTION_ENV) {
            config.backup_retention = n;
        }
        if let Ok(owner) = std::env::var(RECOVERY_OWNER_ENV) {
            if !owner.is_empty() {
                config.recovery_owner = owner;
            }
        }
        config
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_backup_retention(mut self, retention: usize) -> Self {
        self.backup_retention = retention;
        self
    }

    pub fn with_recovery_owner(mut self, owner: impl Into<String>) -> Self {
        self.recovery_owner = owner.into();
        self
    }

    /// Registers the value handed out for `name` when it cannot be read.
    pub fn with_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
        self
    }

    /// Directory holding snapshots.
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_SUBDIR)
    }
}

/// Default root: `~/.fleet/state`.
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(DEFAULT_STATE_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
        .join("state")
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(var = key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}
