//! Cross-process document locks backed by sidecar files.
//!
//! A lock is a JSON file next to the document:
//!
//! ```json
//! {"lockId":"lock-…","ownerId":"worker-1","acquiredAt":"2026-10-17T09:00:00Z","pid":4242}
//! ```
//!
//! Granting a lock is a single create-if-absent of that file. There is no
//! expiry timer: a lock older than the caller's timeout is treated as
//! abandoned and reclaimed by the next `acquire`. Removing a lock is always
//! compare-and-delete, so a late `release` from a crashed owner can never
//! delete a lock granted to someone else after reclamation.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::atomic::{create_exclusive, ensure_dir, read_optional};
use crate::error::{Result, StoreError};

/// How many grant attempts `acquire` makes before giving up on a path that
/// keeps changing underneath it.
const MAX_ATTEMPTS: usize = 4;

/// Token identifying one grant of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(String);

impl LockId {
    /// Creates a new random lock ID.
    pub fn new() -> Self {
        Self(format!("lock-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LockId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Contents of a lock sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub lock_id: LockId,
    pub owner_id: String,
    pub acquired_at: DateTime<Utc>,
    pub pid: u32,
}

impl LockRecord {
    fn new(owner: &str) -> Self {
        Self {
            lock_id: LockId::new(),
            owner_id: owner.to_string(),
            acquired_at: Utc::now(),
            pid: std::process::id(),
        }
    }

    /// Time since the lock was granted. A timestamp from the future counts
    /// as zero.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.acquired_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// What `inspect` finds at a lock path.
#[derive(Debug, Clone)]
pub enum LockState {
    /// A well-formed lock.
    Held(LockRecord),
    /// A sidecar that does not parse; aged by modification time.
    Unreadable { age: Duration },
}

impl LockState {
    pub fn age(&self) -> Duration {
        match self {
            LockState::Held(record) => record.age(),
            LockState::Unreadable { age } => *age,
        }
    }

    fn owner(&self) -> &str {
        match self {
            LockState::Held(record) => &record.owner_id,
            LockState::Unreadable { .. } => "<unreadable>",
        }
    }
}

/// Grants and revokes sidecar locks.
///
/// Each instance remembers the locks it granted so a consumer can release
/// them all on shutdown. That bookkeeping is per instance; two managers in
/// one process see each other only through the filesystem, exactly like two
/// processes do.
#[derive(Debug, Default)]
pub struct LockManager {
    held: Mutex<HashMap<PathBuf, LockId>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn held_map(&self) -> MutexGuard<'_, HashMap<PathBuf, LockId>> {
        // The map is bookkeeping only; a panic elsewhere cannot corrupt it.
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquires the lock at `path` for `owner`.
    ///
    /// Fails with [`StoreError::LockContention`] while another owner holds a
    /// lock younger than `timeout`. An older lock, or one held by `owner`
    /// itself, is replaced and a fresh [`LockId`] is issued.
    pub fn acquire(&self, path: &Path, owner: &str, timeout: Duration) -> Result<LockRecord> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        for _ in 0..MAX_ATTEMPTS {
            let record = LockRecord::new(owner);
            let bytes = serde_json::to_vec(&record).map_err(|source| StoreError::Serialization {
                name: path.display().to_string(),
                source,
            })?;

            if create_exclusive(path, &bytes)? {
                debug!(
                    path = %path.display(),
                    owner = %owner,
                    lock_id = %record.lock_id,
                    "Acquired lock"
                );
                self.held_map()
                    .insert(path.to_path_buf(), record.lock_id.clone());
                return Ok(record);
            }

            // Someone holds it, or held it a moment ago.
            let Some((state, seen)) = read_sidecar(path)? else {
                continue;
            };
            let age = state.age();
            match &state {
                LockState::Held(existing) if age > timeout => {
                    warn!(
                        path = %path.display(),
                        previous_owner = %existing.owner_id,
                        previous_pid = existing.pid,
                        age_ms = age.as_millis() as u64,
                        "Reclaiming stale lock"
                    );
                }
                LockState::Held(existing) if existing.owner_id == owner => {
                    debug!(
                        path = %path.display(),
                        owner = %owner,
                        superseded = %existing.lock_id,
                        "Superseding own lock"
                    );
                }
                LockState::Unreadable { .. } if age > timeout => {
                    warn!(
                        path = %path.display(),
                        age_ms = age.as_millis() as u64,
                        "Reclaiming unreadable lock"
                    );
                }
                _ => return Err(contention(path, &state)),
            }

            remove_if_unchanged(path, &seen)?;
        }

        match read_sidecar(path)? {
            Some((state, _)) => Err(contention(path, &state)),
            None => Err(StoreError::LockContention {
                path: path.to_path_buf(),
                owner: "<unknown>".to_string(),
                age: Duration::ZERO,
            }),
        }
    }

    /// Releases the lock at `path` if `lock_id` is still the current grant.
    ///
    /// Returns whether a lock file was removed. A superseded or unknown
    /// `lock_id` is a no-op.
    pub fn release(&self, path: &Path, lock_id: &LockId) -> Result<bool> {
        {
            let mut held = self.held_map();
            if held.get(path) == Some(lock_id) {
                held.remove(path);
            }
        }

        let Some((state, seen)) = read_sidecar(path)? else {
            debug!(path = %path.display(), lock_id = %lock_id, "Lock already gone");
            return Ok(false);
        };

        match state {
            LockState::Held(current) if current.lock_id == *lock_id => {
                let removed = remove_if_unchanged(path, &seen)?;
                if removed {
                    debug!(path = %path.display(), lock_id = %lock_id, "Released lock");
                }
                Ok(removed)
            }
            other => {
                debug!(
                    path = %path.display(),
                    lock_id = %lock_id,
                    current_owner = %other.owner(),
                    "Lock was superseded; release is a no-op"
                );
                Ok(false)
            }
        }
    }

    /// Confirms that `lock_id` is the current grant at `path`.
    pub fn verify(&self, path: &Path, lock_id: &LockId) -> Result<LockRecord> {
        match read_sidecar(path)? {
            Some((LockState::Held(current), _)) if current.lock_id == *lock_id => Ok(current),
            _ => Err(StoreError::NotLocked {
                path: path.to_path_buf(),
                lock_id: lock_id.clone(),
            }),
        }
    }

    /// Returns whatever lock currently sits at `path`.
    pub fn inspect(&self, path: &Path) -> Result<Option<LockState>> {
        Ok(read_sidecar(path)?.map(|(state, _)| state))
    }

    /// Locks granted by this instance and not yet released through it.
    pub fn held(&self) -> Vec<(PathBuf, LockId)> {
        self.held_map()
            .iter()
            .map(|(path, id)| (path.clone(), id.clone()))
            .collect()
    }

    /// Releases every lock this instance still holds. Returns how many lock
    /// files were actually removed.
    pub fn release_all(&self) -> Result<usize> {
        let mut released = 0;
        for (path, lock_id) in self.held() {
            if self.release(&path, &lock_id)? {
                released += 1;
            }
        }
        Ok(released)
    }
}

fn contention(path: &Path, state: &LockState) -> StoreError {
    StoreError::LockContention {
        path: path.to_path_buf(),
        owner: state.owner().to_string(),
        age: state.age(),
    }
}

/// Reads and classifies the sidecar, returning its raw bytes alongside.
fn read_sidecar(path: &Path) -> Result<Option<(LockState, Vec<u8>)>> {
    let Some(bytes) = read_optional(path)? else {
        return Ok(None);
    };

    let state = match serde_json::from_slice::<LockRecord>(&bytes) {
        Ok(record) => LockState::Held(record),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Lock file does not parse");
            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            LockState::Unreadable { age }
        }
    };
    Ok(Some((state, bytes)))
}

/// Removes the lock at `path` only if it still holds `expected`.
///
/// The file is first renamed to a private tombstone, which takes it out of
/// play atomically. If the tombstone turns out to be a different lock than
/// the one inspected, it is linked back into place.
///
/// Between the rename and the relink `path` is briefly vacant, and a third
/// party may create a lock there. The replaced lock cannot then be restored
/// without clobbering the newcomer, so the relink fails and that error is
/// returned; the replaced holder finds out through `verify`.
fn remove_if_unchanged(path: &Path, expected: &[u8]) -> Result<bool> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tombstone =
        path.with_file_name(format!("{}.reclaim.{}", file_name, Uuid::new_v4().simple()));

    match fs::rename(path, &tombstone) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(source) => return Err(StoreError::io(path, source)),
    }

    let taken = fs::read(&tombstone).unwrap_or_default();
    let unchanged = taken == expected;
    let restored = if unchanged {
        Ok(())
    } else {
        restore_replaced(&tombstone, path)
    };
    if let Err(e) = fs::remove_file(&tombstone) {
        warn!(path = %tombstone.display(), error = %e, "Failed to remove lock tombstone");
    }
    restored.map(|()| unchanged)
}

/// Links `tombstone` back to `path` without replacing anything found there.
fn restore_replaced(tombstone: &Path, path: &Path) -> Result<()> {
    fs::hard_link(tombstone, path).map_err(|source| {
        warn!(
            path = %path.display(),
            error = %source,
            "Could not restore a lock replaced during reclamation"
        );
        StoreError::io(path, source)
    })
}
