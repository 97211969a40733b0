//! Rolling snapshots of documents taken before each overwrite.
//!
//! Snapshots live in one flat directory and are named
//! `<file>.backup.<micros>`, where `<micros>` is the snapshot time in
//! microseconds since the Unix epoch. Only the newest `retention` snapshots
//! per document survive a rotation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::atomic::{create_exclusive, ensure_dir, read_optional};
use crate::error::{Result, StoreError};
use crate::serializer::decode;

const BACKUP_MARKER: &str = ".backup.";

/// A snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Takes, prunes, and looks up snapshots.
#[derive(Debug, Clone)]
pub struct BackupRotator {
    dir: PathBuf,
    retention: usize,
}

impl BackupRotator {
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshots `document` and prunes old snapshots of it.
    ///
    /// Returns `None` when there is no document to snapshot yet.
    pub fn rotate(&self, document: &Path) -> Result<Option<Backup>> {
        let backup = self.snapshot(document)?;
        if backup.is_some() {
            self.prune(document)?;
        }
        Ok(backup)
    }

    /// Copies the current bytes of `document` into a new snapshot.
    pub fn snapshot(&self, document: &Path) -> Result<Option<Backup>> {
        let Some(bytes) = read_optional(document)? else {
            return Ok(None);
        };
        ensure_dir(&self.dir)?;

        let prefix = snapshot_prefix(document);
        let mut timestamp = Utc::now().timestamp_micros();
        loop {
            let path = self.dir.join(format!("{}{}", prefix, timestamp));
            if create_exclusive(&path, &bytes)? {
                debug!(document = %document.display(), backup = %path.display(), "Took snapshot");
                return Ok(Some(Backup { path, timestamp }));
            }
            // Two snapshots within one microsecond; take the next slot.
            timestamp += 1;
        }
    }

    /// Deletes all but the newest `retention` snapshots of `document`.
    ///
    /// Returns the deleted paths.
    pub fn prune(&self, document: &Path) -> Result<Vec<PathBuf>> {
        let backups = self.list(document)?;
        let mut removed = Vec::new();
        for old in backups.into_iter().skip(self.retention) {
            match fs::remove_file(&old.path) {
                Ok(()) => removed.push(old.path),
                // Another process pruned it first.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::io(&old.path, source)),
            }
        }
        if !removed.is_empty() {
            debug!(document = %document.display(), count = removed.len(), "Pruned snapshots");
        }
        Ok(removed)
    }

    /// Snapshots of `document`, newest first.
    pub fn list(&self, document: &Path) -> Result<Vec<Backup>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::io(&self.dir, source)),
        };

        let prefix = snapshot_prefix(document);
        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::io(&self.dir, source))?;
            let file_name = entry.file_name();
            let Some(timestamp) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix(prefix.as_str()))
                .and_then(|ts| ts.parse::<i64>().ok())
            else {
                continue;
            };
            backups.push(Backup {
                path: entry.path(),
                timestamp,
            });
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// The newest snapshot of `document` that parses as JSON, with its bytes
    /// and parsed value.
    pub fn latest_valid(&self, document: &Path) -> Result<Option<(Backup, Vec<u8>, Value)>> {
        for backup in self.list(document)? {
            let Some(bytes) = read_optional(&backup.path)? else {
                continue;
            };
            match decode(&bytes) {
                Ok(value) => return Ok(Some((backup, bytes, value))),
                Err(e) => {
                    warn!(backup = %backup.path.display(), error = %e, "Skipping corrupt snapshot");
                }
            }
        }
        Ok(None)
    }
}

fn snapshot_prefix(document: &Path) -> String {
    let file_name = document
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{}{}", file_name, BACKUP_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PathBuf, BackupRotator) {
        let dir = tempdir().unwrap();
        let document = dir.path().join("tasks.json");
        let rotator = BackupRotator::new(dir.path().join(".backups"), 3);
        (dir, document, rotator)
    }

    #[test]
    fn test_snapshot_missing_document() {
        let (_dir, document, rotator) = setup();
        assert!(rotator.rotate(&document).unwrap().is_none());
        assert!(rotator.list(&document).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_copies_bytes() {
        let (_dir, document, rotator) = setup();
        fs::write(&document, b"{\"v\":1}").unwrap();

        let backup = rotator.rotate(&document).unwrap().unwrap();

        assert_eq!(fs::read(&backup.path).unwrap(), b"{\"v\":1}");
        assert!(backup
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tasks.json.backup."));
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let (_dir, document, rotator) = setup();
        for v in 0..5 {
            fs::write(&document, format!("{{\"v\":{}}}", v)).unwrap();
            rotator.rotate(&document).unwrap();
        }

        let backups = rotator.list(&document).unwrap();
        assert_eq!(backups.len(), 3);
        assert!(backups.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert_eq!(fs::read(&backups[0].path).unwrap(), b"{\"v\":4}");
        assert_eq!(fs::read(&backups[2].path).unwrap(), b"{\"v\":2}");
    }

    #[test]
    fn test_list_ignores_other_documents() {
        let (dir, document, rotator) = setup();
        let other = dir.path().join("tasks-archive.json");
        fs::write(&document, b"{}").unwrap();
        fs::write(&other, b"[]").unwrap();

        rotator.rotate(&document).unwrap();
        rotator.rotate(&other).unwrap();
        fs::write(rotator.dir().join("tasks.json.backup.notanumber"), b"{}").unwrap();

        assert_eq!(rotator.list(&document).unwrap().len(), 1);
        assert_eq!(rotator.list(&other).unwrap().len(), 1);
    }

    #[test]
    fn test_latest_valid_skips_corrupt() {
        let (_dir, document, rotator) = setup();
        fs::write(&document, b"{\"good\":true}").unwrap();
        rotator.rotate(&document).unwrap();
        fs::write(&document, b"{broken").unwrap();
        rotator.rotate(&document).unwrap();

        let (_, bytes, value) = rotator.latest_valid(&document).unwrap().unwrap();
        assert_eq!(bytes, b"{\"good\":true}");
        assert_eq!(value, json!({ "good": true }));
    }
}
