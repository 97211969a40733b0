//! Atomic file operations for crash-safe persistence.
//!
//! Every write lands in a temporary file in the target's own directory and is
//! renamed over the target, so readers see either the old bytes or the new
//! ones and never a torn write.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Result, StoreError};

/// Ensures `dir` exists.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| StoreError::io(dir, source))
}

/// Writes `data` to a synced temporary file next to `path`.
fn stage(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let dir = path.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|source| StoreError::io(dir, source))?;
    temp_file
        .write_all(data)
        .and_then(|_| temp_file.flush())
        .and_then(|_| temp_file.as_file().sync_all())
        .map_err(|source| StoreError::io(temp_file.path(), source))?;
    Ok(temp_file)
}

/// Deletes a staged file, logging rather than failing if that goes wrong.
fn discard(temp_file: NamedTempFile) {
    let temp_path = temp_file.path().to_path_buf();
    if let Err(e) = temp_file.close() {
        warn!(path = %temp_path.display(), error = %e, "Failed to remove temp file");
    }
}

/// Writes data to a file atomically.
///
/// When `validate_json` is set, the staged bytes are read back from disk and
/// parsed before the rename; a parse failure removes the temp file and leaves
/// the target untouched.
pub fn atomic_write(path: &Path, data: &[u8], validate_json: bool) -> Result<()> {
    let temp_file = stage(path, data)?;

    if validate_json {
        let staged = match fs::read(temp_file.path()) {
            Ok(bytes) => bytes,
            Err(source) => {
                let err = StoreError::io(temp_file.path(), source);
                discard(temp_file);
                return Err(err);
            }
        };
        if let Err(source) = serde_json::from_slice::<serde_json::Value>(&staged) {
            discard(temp_file);
            return Err(StoreError::Validation {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    temp_file
        .persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// Creates `path` with `data` only if nothing exists there yet.
///
/// Returns `Ok(false)` when the path is already taken. The file appears with
/// its full contents or not at all.
pub fn create_exclusive(path: &Path, data: &[u8]) -> Result<bool> {
    let temp_file = stage(path, data)?;
    match temp_file.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            discard(e.file);
            Ok(false)
        }
        Err(e) => {
            let err = StoreError::io(path, e.error);
            discard(e.file);
            Err(err)
        }
    }
}

/// Reads a file, returning `None` if it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::io(path, source)),
    }
}
