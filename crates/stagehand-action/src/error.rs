//! Error types for actions and the cache store
//!
//! - [`ActionError`]: probing the filesystem and mapping paths
//! - [`DocumentError`]: decoding sketch document streams
//! - [`StoreError`]: reading and writing cache entry files

use stagehand_paths::RelativizeError;
use std::path::PathBuf;

/// Errors capturing or validating an action
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The filesystem could not be probed
    #[error("cannot probe {}: {source}", .path.display())]
    Probe {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Directory access carries an unusable glob pattern
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// Underlying error
        #[source]
        source: glob::PatternError,
    },

    /// A path could not be re-rooted between stage and store
    #[error("path mapping failed: {0}")]
    Mapping(#[from] RelativizeError),
}

impl ActionError {
    /// Create probe error for path
    pub fn probe(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Probe {
            path: path.into(),
            source,
        }
    }
}

/// Errors decoding a sketch document stream
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// One document of the stream is not a valid sketch
    #[error("malformed sketch document #{index}: {source}")]
    Malformed {
        /// Zero-based document index
        index: usize,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },

    /// Encoding a sketch failed
    #[error("cannot encode sketch: {0}")]
    Encode(#[source] serde_yaml::Error),

    /// Writing the stream failed
    #[error("cannot write sketch document: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors of the action cache store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Entry was written by an unknown store version
    #[error("incompatible cache entry {}: version '{found}' (expected '{expected}')", .path.display())]
    IncompatibleVersion {
        /// Path involved
        path: PathBuf,
        /// Version found in the file
        found: String,
        /// Version this store writes
        expected: &'static str,
    },

    /// Entry file cannot be decoded
    #[error("malformed cache entry {}: {source}", .path.display())]
    Malformed {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },

    /// Entry could not be encoded
    #[error("cannot encode cache entry: {0}")]
    Encode(#[source] serde_yaml::Error),

    /// Reading or writing the entry file failed
    #[error("io error on cache entry {}: {source}", .path.display())]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Capturing or validating an action failed
    #[error(transparent)]
    Action(#[from] ActionError),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole build
    ///
    /// A cache file that cannot be trusted at all (unknown version or
    /// undecodable) stops the build; everything else only fails the
    /// computation that hit it.
    #[inline]
    #[must_use]
    pub fn is_fatal_for_build(&self) -> bool {
        matches!(self, Self::IncompatibleVersion { .. } | Self::Malformed { .. })
    }
}
