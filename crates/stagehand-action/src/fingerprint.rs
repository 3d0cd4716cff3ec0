//! Filesystem fingerprints
//!
//! A fingerprint is a short string describing the observable state of a
//! path at the time an action was captured. An action is up to date when
//! re-probing yields the same string.

use crate::error::ActionError;
use glob::Pattern;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Path does not exist
pub const NOT_EXISTS: &str = "stat:not-exists";

/// Path exists but is not a directory
pub const NOT_DIRECTORY: &str = "stat:not-directory";

/// Directory could not be listed
pub const IO_ERROR: &str = "err:io";

/// Pattern used for directory accesses that do not name one
pub const DEFAULT_PATTERN: &str = "**/*";

/// Fingerprint of a file: existence plus last-modified time in milliseconds
///
/// # Errors
/// Returns [`ActionError::Probe`] if the file exists but cannot be inspected
pub fn file_fingerprint(path: &Path) -> Result<String, ActionError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(NOT_EXISTS.to_string()),
        Err(err) => return Err(ActionError::probe(path, err)),
    };
    let modified = metadata
        .modified()
        .map_err(|err| ActionError::probe(path, err))?;

    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_millis().to_string(),
        Err(before) => format!("-{}", before.duration().as_millis()),
    };
    Ok(format!("mtime:{millis}"))
}

/// Fingerprint of a directory: digest over the sorted names of its direct
/// children that match `pattern`
///
/// Listing failures are folded into [`IO_ERROR`].
#[must_use]
pub fn directory_fingerprint(path: &Path, pattern: &Pattern) -> String {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return NOT_EXISTS.to_string(),
        Err(_) => return IO_ERROR.to_string(),
    };
    if !metadata.is_dir() {
        return NOT_DIRECTORY.to_string();
    }

    let mut names = Vec::new();
    let Ok(entries) = fs::read_dir(path) else {
        return IO_ERROR.to_string();
    };
    for entry in entries {
        let Ok(entry) = entry else {
            return IO_ERROR.to_string();
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.matches(&name) {
            names.push(name);
        }
    }
    names.sort();

    let mut hasher = Sha256::new();
    for name in &names {
        hasher.update(name.as_bytes());
    }
    format!("namesum:{} ({} files)", hex::encode(hasher.finalize()), names.len())
}

/// Compile a directory access pattern
///
/// # Errors
/// Returns [`ActionError::InvalidPattern`] for malformed globs
pub fn compile_pattern(pattern: &str) -> Result<Pattern, ActionError> {
    Pattern::new(pattern).map_err(|source| ActionError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
