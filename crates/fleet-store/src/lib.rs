//! Lock-guarded JSON documents on plain files.
//!
//! Independent processes share state (worker status, task lists, project
//! configuration) through a directory of JSON documents. The filesystem is
//! the only coordination medium:
//!
//! - a sidecar `<name>.json.lock` created exclusively grants a per-document
//!   mutex; locks older than the caller's timeout are reclaimed lazily
//! - writes go through a temp file and an atomic rename, after a snapshot of
//!   the previous version is taken into `.backups/`
//! - reads that hit corruption repair what they can, fall back to the newest
//!   valid snapshot, and finally to the document's default
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use fleet_models::TaskList;
//! use fleet_store::DocumentStore;
//!
//! let store = DocumentStore::open("/tmp/fleet");
//! let timeout = Duration::from_secs(30);
//! let id = store
//!     .modify::<TaskList, _, _>("planner", timeout, |tasks| tasks.add("index repo"))
//!     .unwrap();
//!
//! let tasks: TaskList = store.load().unwrap();
//! assert!(tasks.find(id.as_str()).is_some());
//! ```

pub mod atomic;
pub mod backup;
pub mod config;
pub mod defaults;
pub mod error;
pub mod layout;
pub mod lock;
pub mod recovery;
pub mod repair;
pub mod serializer;
pub mod store;

pub use backup::{Backup, BackupRotator};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use layout::DocumentName;
pub use lock::{LockId, LockManager, LockRecord, LockState};
pub use recovery::{ReadOutcome, ReadSource};
pub use repair::Fix;
pub use store::DocumentStore;
