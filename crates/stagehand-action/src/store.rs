//! Per-stage action cache store
//!
//! Every specification name owns one YAML entry file:
//! `<store dir>/<name>.actions.yml`. An entry is replayable only when it
//! was written for the same opaque id and every recorded action is still
//! up to date; otherwise the computation runs again and the entry is
//! replaced as a whole.

use crate::action::{Action, Sketch};
use crate::error::StoreError;
use crate::mapping::PathMapping;
use crate::spec::Specification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Version tag written into every entry
pub const STORE_VERSION: &str = "v1";

/// Suffix of entry files
pub const ENTRY_SUFFIX: &str = ".actions.yml";

/// On-disk cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Store format version, [`STORE_VERSION`]
    pub version: String,
    /// Opaque id of the specification that produced the actions
    pub spec_opaque_id: String,
    /// When the entry was written
    pub update_time: DateTime<Utc>,
    /// Recorded actions, in order
    pub actions: Vec<Action>,
}

/// A validated entry, ready for replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedEntry {
    /// Recorded sketches in their original order
    pub sketches: Vec<Sketch>,
    /// When the entry was written
    pub update_time: DateTime<Utc>,
}

/// Cache store of one stage
#[derive(Debug, Clone)]
pub struct ActionStore {
    mapping: PathMapping,
}

impl ActionStore {
    /// Create store for `stage_dir`, persisting entries under `store_dir`
    #[must_use]
    pub fn new(stage_dir: impl AsRef<Path>, store_dir: impl AsRef<Path>) -> Self {
        Self {
            mapping: PathMapping::new(stage_dir, store_dir),
        }
    }

    /// Path mapping between stage and store
    #[inline]
    #[must_use]
    pub fn mapping(&self) -> &PathMapping {
        &self.mapping
    }

    /// Entry file of a specification
    #[must_use]
    pub fn entry_path(&self, spec: &Specification) -> PathBuf {
        self.mapping
            .store_dir()
            .join(format!("{}{ENTRY_SUFFIX}", spec.name()))
    }

    /// Load a replayable entry for `spec`
    ///
    /// Returns `Ok(None)` when there is no entry, when it was written for a
    /// different opaque id, or when any recorded action is stale.
    ///
    /// # Errors
    /// - [`StoreError::IncompatibleVersion`] for entries of another store version
    /// - [`StoreError::Malformed`] for undecodable entries
    /// - [`StoreError::Io`] / [`StoreError::Action`] when reading or probing fails
    pub fn load(&self, spec: &Specification) -> Result<Option<LoadedEntry>, StoreError> {
        let path = self.entry_path(spec);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::trace!(spec = spec.name(), "no cache entry");
                return Ok(None);
            }
            Err(err) => return Err(StoreError::io_error(&path, err)),
        };

        let entry = decode_entry(&path, &text)?;

        if entry.spec_opaque_id != spec.opaque_id() {
            tracing::debug!(spec = spec.name(), "cache entry written for a different opaque id");
            return Ok(None);
        }

        for action in &entry.actions {
            if !action.is_up_to_date(&self.mapping)? {
                tracing::debug!(spec = spec.name(), ?action, "cached action is stale");
                return Ok(None);
            }
        }

        let sketches = entry
            .actions
            .iter()
            .map(|action| action.to_sketch(&self.mapping))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(spec = spec.name(), actions = sketches.len(), "cache entry is up to date");
        Ok(Some(LoadedEntry {
            sketches,
            update_time: entry.update_time,
        }))
    }

    /// Capture fingerprints for `sketches` and persist them for `spec`
    ///
    /// The entry is written to a temporary file in the store directory and
    /// renamed into place.
    ///
    /// # Errors
    /// Returns error if probing, encoding or writing fails
    pub fn write(&self, spec: &Specification, sketches: &[Sketch]) -> Result<PathBuf, StoreError> {
        let actions = sketches
            .iter()
            .map(|sketch| sketch.to_action(&self.mapping))
            .collect::<Result<Vec<_>, _>>()?;

        let entry = CacheEntry {
            version: STORE_VERSION.to_string(),
            spec_opaque_id: spec.opaque_id().to_string(),
            update_time: Utc::now(),
            actions,
        };

        let path = self.entry_path(spec);
        let text = serde_yaml::to_string(&entry).map_err(StoreError::Encode)?;

        let dir = self.mapping.store_dir();
        fs::create_dir_all(dir).map_err(|err| StoreError::io_error(dir, err))?;
        let mut temp =
            tempfile::NamedTempFile::new_in(dir).map_err(|err| StoreError::io_error(dir, err))?;
        temp.write_all(text.as_bytes())
            .map_err(|err| StoreError::io_error(temp.path(), err))?;
        temp.persist(&path)
            .map_err(|err| StoreError::io_error(&path, err.error))?;

        tracing::debug!(spec = spec.name(), path = %path.display(), "cache entry written");
        Ok(path)
    }
}

fn decode_entry(path: &Path, text: &str) -> Result<CacheEntry, StoreError> {
    let malformed = |source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    let raw: serde_yaml::Value = serde_yaml::from_str(text).map_err(malformed)?;
    let found = raw
        .get("version")
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or_default();
    if found != STORE_VERSION {
        return Err(StoreError::IncompatibleVersion {
            path: path.to_path_buf(),
            found: found.to_string(),
            expected: STORE_VERSION,
        });
    }

    serde_yaml::from_value(raw).map_err(malformed)
}
