//! Error types for store operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::lock::LockId;

/// Errors that can occur during store operations.
///
/// Only [`StoreError::LockContention`] is worth retrying; everything else is
/// fatal to the operation that raised it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A live lock is held by another owner.
    #[error("{path} is locked by {owner} (held for {}ms)", .age.as_millis())]
    LockContention {
        path: PathBuf,
        owner: String,
        age: Duration,
    },

    /// Write attempted with a lock token that is not the current holder.
    #[error("{path} is not locked by {lock_id}")]
    NotLocked { path: PathBuf, lock_id: LockId },

    /// Content could not be encoded.
    #[error("failed to serialize {name}: {source}")]
    Serialization {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Bytes about to be committed are not valid JSON.
    #[error("refusing to write invalid JSON to {path}: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Stored value does not decode into the requested document type.
    #[error("{name} does not decode as the requested type: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document name is empty or would escape the store root.
    #[error("invalid document name: {0:?}")]
    InvalidName(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// True if the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockContention { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_contention_is_retryable() {
        let contention = StoreError::LockContention {
            path: PathBuf::from("tasks.json.lock"),
            owner: "alex".to_string(),
            age: Duration::from_millis(120),
        };
        assert!(contention.is_retryable());
        assert!(contention.to_string().contains("alex"));
        assert!(contention.to_string().contains("120ms"));

        let io = StoreError::io(
            "tasks.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!io.is_retryable());
        assert!(!StoreError::InvalidName("..".into()).is_retryable());
    }
}
