//! On-disk layout for a document.
//!
//! ```text
//! root/
//! ├── tasks.json              # document
//! ├── tasks.json.lock         # lock sidecar while held
//! └── .backups/
//!     ├── tasks.json.backup.1760700000123456
//!     └── tasks.json.backup.1760700000456789
//! ```
//!
//! The three paths for one name form a single consistency unit: every store
//! operation derives all of them from the same [`DocumentName`].

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

const JSON_SUFFIX: &str = ".json";
const LOCK_SUFFIX: &str = ".lock";

/// A validated document name, stored without the `.json` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentName(String);

impl DocumentName {
    /// Parses a caller-supplied name. `tasks` and `tasks.json` are the same
    /// document.
    pub fn parse(raw: &str) -> Result<Self> {
        let stem = raw.strip_suffix(JSON_SUFFIX).unwrap_or(raw);
        let invalid = stem.is_empty()
            || stem.starts_with('.')
            || stem.contains(['/', '\\', '\0'])
            || stem.contains("..");
        if invalid {
            return Err(StoreError::InvalidName(raw.to_string()));
        }
        Ok(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the document itself, e.g. `tasks.json`.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.0, JSON_SUFFIX)
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every path belonging to one document.
#[derive(Debug, Clone)]
pub struct DocumentPaths {
    pub name: DocumentName,
    pub document: PathBuf,
    pub lock: PathBuf,
    pub backup_dir: PathBuf,
}

impl DocumentPaths {
    pub fn new(root: &Path, backup_dir: &Path, name: DocumentName) -> Self {
        let file_name = name.file_name();
        Self {
            document: root.join(&file_name),
            lock: root.join(format!("{}{}", file_name, LOCK_SUFFIX)),
            backup_dir: backup_dir.to_path_buf(),
            name,
        }
    }

    /// Whether the document holds JSON and must be parse-checked on write.
    pub fn is_json(&self) -> bool {
        self.document
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_suffix() {
        assert_eq!(DocumentName::parse("tasks.json").unwrap().as_str(), "tasks");
        assert_eq!(DocumentName::parse("tasks").unwrap().as_str(), "tasks");
        assert_eq!(
            DocumentName::parse("worker-status").unwrap().file_name(),
            "worker-status.json"
        );
    }

    #[test]
    fn test_parse_rejects_escapes() {
        for bad in ["", ".json", "../etc/passwd", "a/b", "a\\b", ".backups", "a..b"] {
            assert!(
                matches!(DocumentName::parse(bad), Err(StoreError::InvalidName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_paths() {
        let name = DocumentName::parse("tasks").unwrap();
        let paths = DocumentPaths::new(Path::new("/s"), Path::new("/s/.backups"), name);

        assert_eq!(paths.document, PathBuf::from("/s/tasks.json"));
        assert_eq!(paths.lock, PathBuf::from("/s/tasks.json.lock"));
        assert_eq!(paths.backup_dir, PathBuf::from("/s/.backups"));
        assert!(paths.is_json());
    }
}
