//! Self-healing reads.
//!
//! A read that fails to parse walks a fixed ladder: bounded repair of the
//! bytes on disk, then the newest snapshot that parses, then the document's
//! default. The first two produce bytes that the store writes back so the
//! next reader finds a healthy file.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::atomic::read_optional;
use crate::backup::BackupRotator;
use crate::error::Result;
use crate::layout::DocumentPaths;
use crate::repair::{repair, Fix};
use crate::serializer::decode;

/// Where a read's value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSource {
    /// Parsed straight from disk.
    Disk,
    /// No document yet; the default was returned.
    Missing,
    /// The file was corrupt and repaired in place.
    Repaired { fixes: BTreeSet<Fix> },
    /// The file was corrupt beyond repair and restored from a snapshot.
    Backup { path: PathBuf },
    /// Nothing could be recovered; the default was returned.
    Default,
}

/// The value of a read and how it was obtained.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub value: Value,
    pub source: ReadSource,
}

impl ReadOutcome {
    /// True when the document existed but its content was lost.
    pub fn is_data_loss(&self) -> bool {
        self.source == ReadSource::Default
    }
}

/// Result of running the recovery ladder.
#[derive(Debug)]
pub(crate) struct Recovery {
    pub outcome: ReadOutcome,
    /// Bytes found on disk, if any.
    pub seen: Option<Vec<u8>>,
    /// Bytes that should replace the document.
    pub write_back: Option<Vec<u8>>,
}

/// Reads the document at `paths`, recovering from corruption if needed.
///
/// Performs no writes; persisting `write_back` is up to the caller, which
/// decides under which lock to do it.
pub(crate) fn recover(
    paths: &DocumentPaths,
    backups: &BackupRotator,
    default: impl FnOnce() -> Value,
) -> Result<Recovery> {
    let Some(bytes) = read_optional(&paths.document)? else {
        return Ok(Recovery {
            outcome: ReadOutcome {
                value: default(),
                source: ReadSource::Missing,
            },
            seen: None,
            write_back: None,
        });
    };

    let parse_error = match decode(&bytes) {
        Ok(value) => {
            return Ok(Recovery {
                outcome: ReadOutcome {
                    value,
                    source: ReadSource::Disk,
                },
                seen: Some(bytes),
                write_back: None,
            });
        }
        Err(e) => e,
    };
    warn!(
        document = %paths.document.display(),
        error = %parse_error,
        "Document does not parse, attempting recovery"
    );

    if let Some(repaired) = std::str::from_utf8(&bytes).ok().and_then(repair) {
        let fixes: Vec<String> = repaired.fixes.iter().map(Fix::to_string).collect();
        info!(
            document = %paths.document.display(),
            fixes = %fixes.join(","),
            "Repaired corrupt document"
        );
        let mut text = repaired.text.into_bytes();
        if text.last() != Some(&b'\n') {
            text.push(b'\n');
        }
        return Ok(Recovery {
            outcome: ReadOutcome {
                value: repaired.value,
                source: ReadSource::Repaired {
                    fixes: repaired.fixes,
                },
            },
            seen: Some(bytes),
            write_back: Some(text),
        });
    }

    if let Some((backup, backup_bytes, value)) = backups.latest_valid(&paths.document)? {
        warn!(
            document = %paths.document.display(),
            backup = %backup.path.display(),
            "Restoring document from snapshot"
        );
        return Ok(Recovery {
            outcome: ReadOutcome {
                value,
                source: ReadSource::Backup { path: backup.path },
            },
            seen: Some(bytes),
            write_back: Some(backup_bytes),
        });
    }

    error!(
        document = %paths.document.display(),
        "Document unrecoverable and no valid snapshot exists; returning default"
    );
    Ok(Recovery {
        outcome: ReadOutcome {
            value: default(),
            source: ReadSource::Default,
        },
        seen: Some(bytes),
        write_back: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DocumentName;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn setup(dir: &std::path::Path) -> (DocumentPaths, BackupRotator) {
        let backup_dir = dir.join(".backups");
        let paths = DocumentPaths::new(dir, &backup_dir, DocumentName::parse("tasks").unwrap());
        (paths, BackupRotator::new(backup_dir, 10))
    }

    #[test]
    fn test_missing_returns_default_without_write_back() {
        let dir = tempdir().unwrap();
        let (paths, backups) = setup(dir.path());

        let r = recover(&paths, &backups, || json!({ "tasks": [] })).unwrap();
        assert_eq!(r.outcome.source, ReadSource::Missing);
        assert_eq!(r.outcome.value, json!({ "tasks": [] }));
        assert!(!r.outcome.is_data_loss());
        assert!(r.write_back.is_none());
    }

    #[test]
    fn test_repair_produces_write_back() {
        let dir = tempdir().unwrap();
        let (paths, backups) = setup(dir.path());
        fs::write(&paths.document, b"{\"a\":1,}").unwrap();

        let r = recover(&paths, &backups, || json!({})).unwrap();
        assert_eq!(r.outcome.value, json!({ "a": 1 }));
        assert!(matches!(r.outcome.source, ReadSource::Repaired { .. }));
        assert_eq!(r.write_back.unwrap(), b"{\"a\":1}\n");
        assert_eq!(r.seen.unwrap(), b"{\"a\":1,}");
    }

    #[test]
    fn test_falls_back_to_backup_then_default() {
        let dir = tempdir().unwrap();
        let (paths, backups) = setup(dir.path());
        fs::write(&paths.document, b"\xff\xfe not json").unwrap();

        let r = recover(&paths, &backups, || json!({ "empty": true })).unwrap();
        assert_eq!(r.outcome.source, ReadSource::Default);
        assert!(r.outcome.is_data_loss());

        fs::create_dir_all(backups.dir()).unwrap();
        fs::write(backups.dir().join("tasks.json.backup.100"), b"{\"v\":1}").unwrap();
        let r = recover(&paths, &backups, || json!({})).unwrap();
        assert_eq!(r.outcome.value, json!({ "v": 1 }));
        assert_eq!(r.write_back.unwrap(), b"{\"v\":1}");
    }
}
