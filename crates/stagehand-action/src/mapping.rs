//! Path mapping between a stage directory and its store directory
//!
//! Sketches carry paths relative to the stage directory; persisted actions
//! carry the same paths relative to the store directory, so a cache entry
//! stays meaningful independent of where the store lives.

use stagehand_paths::{normalize, relativize, RelativizeError};
use std::path::{Path, PathBuf};

/// Re-roots paths between the stage and the store directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    stage_dir: PathBuf,
    store_dir: PathBuf,
}

impl PathMapping {
    /// Create mapping; both directories are normalised lexically
    #[must_use]
    pub fn new(stage_dir: impl AsRef<Path>, store_dir: impl AsRef<Path>) -> Self {
        Self {
            stage_dir: normalize(stage_dir.as_ref()),
            store_dir: normalize(store_dir.as_ref()),
        }
    }

    /// Stage working directory
    #[inline]
    #[must_use]
    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    /// Store directory of the stage
    #[inline]
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Stage-relative path to store-relative path
    ///
    /// # Errors
    /// Returns error if the paths cannot be related lexically
    pub fn stage_to_store(&self, path: &Path) -> Result<PathBuf, RelativizeError> {
        relativize(&self.store_dir, &self.resolve_from_stage(path))
    }

    /// Store-relative path to stage-relative path
    ///
    /// # Errors
    /// Returns error if the paths cannot be related lexically
    pub fn store_to_stage(&self, path: &Path) -> Result<PathBuf, RelativizeError> {
        relativize(&self.stage_dir, &self.resolve_from_store(path))
    }

    /// Resolve a stage-relative path to a normalised path
    #[must_use]
    pub fn resolve_from_stage(&self, path: &Path) -> PathBuf {
        normalize(&self.stage_dir.join(path))
    }

    /// Resolve a store-relative path to a normalised path
    #[must_use]
    pub fn resolve_from_store(&self, path: &Path) -> PathBuf {
        normalize(&self.store_dir.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> PathMapping {
        PathMapping::new("/build/stage1", "/build/.stagehand/actions/stage1")
    }

    #[test]
    fn stage_path_is_rerooted_at_store() {
        let stored = mapping().stage_to_store(Path::new("out/x.txt")).unwrap();
        assert_eq!(stored, PathBuf::from("../../../stage1/out/x.txt"));
    }

    #[test]
    fn store_path_maps_back() {
        let mapping = mapping();
        let stored = mapping.stage_to_store(Path::new("./src/../x.txt")).unwrap();
        assert_eq!(mapping.store_to_stage(&stored).unwrap(), PathBuf::from("x.txt"));
    }

    #[test]
    fn both_sides_resolve_to_same_absolute_path() {
        let mapping = mapping();
        let stored = mapping.stage_to_store(Path::new("a/b")).unwrap();
        assert_eq!(
            mapping.resolve_from_store(&stored),
            mapping.resolve_from_stage(Path::new("a/b"))
        );
        assert_eq!(
            mapping.resolve_from_stage(Path::new("a/b")),
            PathBuf::from("/build/stage1/a/b")
        );
    }

    #[test]
    fn paths_outside_the_stage_survive() {
        let mapping = mapping();
        let stored = mapping.stage_to_store(Path::new("../shared/lib")).unwrap();
        assert_eq!(
            mapping.store_to_stage(&stored).unwrap(),
            PathBuf::from("../shared/lib")
        );
    }
}
