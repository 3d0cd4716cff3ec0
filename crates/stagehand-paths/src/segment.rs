//! Absolute filesystem paths as segment lists
//!
//! Provides [`SegmentPath`], the key type of the collision detector tree.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};

/// Absolute, lexically normalised filesystem path
///
/// Stored as the list of names below the filesystem root, so
/// `/foo/bar` is `["foo", "bar"]` and `/` is the empty list.
/// Normalisation is purely lexical: `.` is dropped and `..` removes the
/// previous segment (never climbing above the root).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SegmentPath(Vec<String>);

impl SegmentPath {
    /// Create path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// The filesystem root
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a segment path from an absolute filesystem path
    ///
    /// # Errors
    /// Returns error if `path` is relative or contains a segment that is not valid UTF-8
    pub fn from_path(path: &Path) -> Result<Self, PathError> {
        if !path.is_absolute() {
            return Err(PathError::NotAbsolute(path.to_path_buf()));
        }

        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    segments.pop();
                }
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| PathError::NonUtf8(path.to_path_buf()))?;
                    segments.push(name.to_string());
                }
            }
        }

        Ok(Self(segments))
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if this is the filesystem root
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Get parent path (if not root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Check if this path is a prefix of another (or equal to it)
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0 == other.0[..self.0.len()]
    }

    /// Check if this path is a strict ancestor of another
    #[inline]
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    /// Get the segments of `self` below `ancestor`
    ///
    /// # Errors
    /// Returns error if `self` is not below `ancestor`
    pub fn relative_to(&self, ancestor: &Self) -> Result<Vec<String>, PathError> {
        if !ancestor.is_prefix_of(self) {
            return Err(PathError::NotDescendant {
                path: self.to_string(),
                ancestor: ancestor.to_string(),
            });
        }
        Ok(self.0[ancestor.0.len()..].to_vec())
    }

    /// Iterator over segments from root to leaf
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Convert back to a filesystem path
    #[must_use]
    pub fn to_path_buf(&self) -> PathBuf {
        let mut path = PathBuf::from("/");
        path.extend(&self.0);
        path
    }
}

impl Display for SegmentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl TryFrom<&Path> for SegmentPath {
    type Error = PathError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        Self::from_path(path)
    }
}

/// Errors related to segment paths
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Path is not absolute
    #[error("path is not absolute: {}", .0.display())]
    NotAbsolute(PathBuf),

    /// Path contains a segment that is not valid UTF-8
    #[error("path is not valid utf-8: {}", .0.display())]
    NonUtf8(PathBuf),

    /// Not a descendant path
    #[error("path '{path}' is not a descendant of '{ancestor}'")]
    NotDescendant {
        /// Offending path
        path: String,
        /// Expected ancestor
        ancestor: String,
    },
}
