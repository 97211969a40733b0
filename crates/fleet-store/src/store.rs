//! The document store facade.

use std::path::Path;
use std::time::Duration;

use fleet_models::Document;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::atomic::{atomic_write, ensure_dir, read_optional};
use crate::backup::{Backup, BackupRotator};
use crate::config::StoreConfig;
use crate::defaults::default_document;
use crate::error::{Result, StoreError};
use crate::layout::{DocumentName, DocumentPaths};
use crate::lock::{LockId, LockManager, LockState};
use crate::recovery::{recover, ReadOutcome, Recovery};
use crate::serializer::encode;

/// Lock-guarded JSON documents under one root directory.
///
/// Every method is synchronous and performs at most one lock cycle. The
/// store never retries on its own; callers decide what to do with
/// [`StoreError::LockContention`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use fleet_store::DocumentStore;
/// use serde_json::json;
///
/// let store = DocumentStore::open("/tmp/fleet");
/// let bump = |v: serde_json::Value| json!(v.as_i64().unwrap_or(0) + 1);
/// store
///     .update("counter", bump, "worker-1", Duration::from_secs(30))
///     .unwrap();
/// assert_eq!(store.get("counter").unwrap(), json!(1));
/// ```
#[derive(Debug)]
pub struct DocumentStore {
    config: StoreConfig,
    locks: LockManager,
    backups: BackupRotator,
}

impl DocumentStore {
    pub fn new(config: StoreConfig) -> Self {
        let backups = BackupRotator::new(config.backup_dir(), config.backup_retention);
        Self {
            config,
            locks: LockManager::new(),
            backups,
        }
    }

    /// Opens a store at `root` with default settings.
    pub fn open(root: impl Into<std::path::PathBuf>) -> Self {
        Self::new(StoreConfig::new(root))
    }

    /// Opens a store configured from the environment.
    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// The lock manager, for callers that need `held`/`release_all`.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    fn paths(&self, name: &str) -> Result<DocumentPaths> {
        let name = DocumentName::parse(name)?;
        ensure_dir(&self.config.root)?;
        Ok(DocumentPaths::new(
            &self.config.root,
            self.backups.dir(),
            name,
        ))
    }

    fn default_for(&self, name: &DocumentName) -> Value {
        default_document(&self.config.defaults, name)
    }

    /// Acquires the lock on `name` for `owner`.
    pub fn acquire(&self, name: &str, owner: &str, timeout: Duration) -> Result<LockId> {
        let paths = self.paths(name)?;
        Ok(self.locks.acquire(&paths.lock, owner, timeout)?.lock_id)
    }

    /// Releases the lock on `name` if `lock_id` is still current.
    pub fn release(&self, name: &str, lock_id: &LockId) -> Result<bool> {
        let paths = self.paths(name)?;
        self.locks.release(&paths.lock, lock_id)
    }

    /// The lock currently sitting on `name`, if any.
    pub fn lock_status(&self, name: &str) -> Result<Option<LockState>> {
        let paths = self.paths(name)?;
        self.locks.inspect(&paths.lock)
    }

    /// Releases every lock this store instance still holds.
    pub fn release_all(&self) -> Result<usize> {
        self.locks.release_all()
    }

    /// Snapshots of `name`, newest first.
    pub fn backups(&self, name: &str) -> Result<Vec<Backup>> {
        let paths = self.paths(name)?;
        self.backups.list(&paths.document)
    }

    /// Writes `content` to `name` under `lock_id`, then releases the lock.
    ///
    /// The lock is released on every path out of this call, success or not.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        name: &str,
        content: &T,
        lock_id: &LockId,
    ) -> Result<()> {
        let paths = self.paths(name)?;
        let encoded = encode(paths.name.as_str(), content);
        self.commit(&paths, encoded, lock_id)
    }

    /// Writes pre-encoded bytes to `name` under `lock_id`, then releases the
    /// lock. JSON documents must parse or the write is refused.
    pub fn write_bytes(&self, name: &str, bytes: &[u8], lock_id: &LockId) -> Result<()> {
        let paths = self.paths(name)?;
        self.commit(&paths, Ok(bytes.to_vec()), lock_id)
    }

    fn commit(
        &self,
        paths: &DocumentPaths,
        encoded: Result<Vec<u8>>,
        lock_id: &LockId,
    ) -> Result<()> {
        let written = self.locks.verify(&paths.lock, lock_id).and_then(|_| {
            let bytes = encoded?;
            self.backups.rotate(&paths.document)?;
            atomic_write(&paths.document, &bytes, paths.is_json())?;
            info!(
                document = %paths.document.display(),
                bytes = bytes.len(),
                "Wrote document"
            );
            Ok(())
        });

        let released = self.locks.release(&paths.lock, lock_id);
        match (written, released) {
            (Ok(()), Ok(_)) => Ok(()),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(
                    lock = %paths.lock.display(),
                    error = %release_err,
                    "Failed to release lock after failed write"
                );
                Err(e)
            }
        }
    }

    fn release_quietly(&self, paths: &DocumentPaths, lock_id: &LockId) {
        if let Err(e) = self.locks.release(&paths.lock, lock_id) {
            warn!(lock = %paths.lock.display(), error = %e, "Failed to release lock");
        }
    }

    /// Reads `name`, recovering from corruption if needed.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.safe_read(name).map(|outcome| outcome.value)
    }

    /// Reads `name` and reports where the value came from.
    ///
    /// A repaired or restored document is written back under the configured
    /// recovery owner. If that lock is busy, or the write-back fails, the
    /// recovered value is still returned.
    pub fn safe_read(&self, name: &str) -> Result<ReadOutcome> {
        let paths = self.paths(name)?;
        let recovery = recover(&paths, &self.backups, || self.default_for(&paths.name))?;
        if recovery.write_back.is_some() {
            self.persist_recovered(&paths, &recovery);
        }
        Ok(recovery.outcome)
    }

    fn persist_recovered(&self, paths: &DocumentPaths, recovery: &Recovery) {
        let Some(bytes) = recovery.write_back.as_deref() else {
            return;
        };

        let record = match self.locks.acquire(
            &paths.lock,
            &self.config.recovery_owner,
            self.config.lock_timeout,
        ) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    document = %paths.document.display(),
                    error = %e,
                    "Could not lock document to persist recovery"
                );
                return;
            }
        };

        // Someone may have rewritten the file while we were recovering it.
        match read_optional(&paths.document) {
            Ok(current) if current == recovery.seen => {}
            Ok(_) => {
                debug!(
                    document = %paths.document.display(),
                    "Document changed during recovery; not persisting"
                );
                self.release_quietly(paths, &record.lock_id);
                return;
            }
            Err(e) => {
                warn!(
                    document = %paths.document.display(),
                    error = %e,
                    "Could not re-read document"
                );
                self.release_quietly(paths, &record.lock_id);
                return;
            }
        }

        if let Err(e) = self.commit(paths, Ok(bytes.to_vec()), &record.lock_id) {
            warn!(
                document = %paths.document.display(),
                error = %e,
                "Failed to persist recovered document"
            );
        }
    }

    /// Locked read-modify-write of `name`.
    ///
    /// `mutate` receives the current value (recovered if necessary) and
    /// returns the replacement, which is written and returned. No other
    /// owner's `update` on `name` can interleave while the lock is live.
    pub fn update<F>(&self, name: &str, mutate: F, owner: &str, timeout: Duration) -> Result<Value>
    where
        F: FnOnce(Value) -> Value,
    {
        self.locked_update(name, owner, timeout, |current| {
            let next = mutate(current);
            Ok((Some(next.clone()), next))
        })
    }

    /// Like [`update`](Self::update), but `mutate` may decline by returning
    /// `None`, in which case the lock is released and nothing is written.
    pub fn update_if<F>(
        &self,
        name: &str,
        mutate: F,
        owner: &str,
        timeout: Duration,
    ) -> Result<Option<Value>>
    where
        F: FnOnce(Value) -> Option<Value>,
    {
        self.locked_update(name, owner, timeout, |current| {
            let next = mutate(current);
            Ok((next.clone(), next))
        })
    }

    /// Reads a typed document.
    pub fn load<D: Document>(&self) -> Result<D> {
        let value = self.get(D::NAME)?;
        serde_json::from_value(value).map_err(|source| StoreError::Decode {
            name: D::NAME.to_string(),
            source,
        })
    }

    /// Locked read-modify-write of a typed document.
    ///
    /// Returns whatever `mutate` returns.
    pub fn modify<D, R, F>(&self, owner: &str, timeout: Duration, mutate: F) -> Result<R>
    where
        D: Document,
        F: FnOnce(&mut D) -> R,
    {
        self.locked_update(D::NAME, owner, timeout, |current| {
            let mut doc: D =
                serde_json::from_value(current).map_err(|source| StoreError::Decode {
                    name: D::NAME.to_string(),
                    source,
                })?;
            let out = mutate(&mut doc);
            Ok((Some(doc), out))
        })
    }

    /// Runs `apply` under the lock. A `None` replacement releases the lock
    /// without writing.
    fn locked_update<S, R, F>(
        &self,
        name: &str,
        owner: &str,
        timeout: Duration,
        apply: F,
    ) -> Result<R>
    where
        S: Serialize,
        F: FnOnce(Value) -> Result<(Option<S>, R)>,
    {
        let paths = self.paths(name)?;
        let record = self.locks.acquire(&paths.lock, owner, timeout)?;

        // Recovery inside an update never writes back on its own; the write
        // below persists the result.
        let applied = recover(&paths, &self.backups, || self.default_for(&paths.name))
            .and_then(|recovery| apply(recovery.outcome.value));

        match applied {
            Ok((None, out)) => {
                debug!(document = %paths.document.display(), "Update declined; nothing written");
                self.locks.release(&paths.lock, &record.lock_id)?;
                Ok(out)
            }
            Ok((Some(next), out)) => {
                let encoded = encode(paths.name.as_str(), &next);
                self.commit(&paths, encoded, &record.lock_id)?;
                Ok(out)
            }
            Err(e) => {
                self.release_quietly(&paths, &record.lock_id);
                Err(e)
            }
        }
    }
}
