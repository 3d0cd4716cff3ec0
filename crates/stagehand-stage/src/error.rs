//! Error types for stages
//!
//! Provides error handling for:
//! - Unit construction and execution failures
//! - Fatal stage errors (duplicate names, untrustworthy cache entries)
//! - Worker pool setup

use stagehand_action::{DocumentError, SpecError, StoreError};
use std::path::PathBuf;

/// Errors raised by units
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// No factory is registered for the specification's unit type
    #[error("no unit registered for type '{0}'")]
    UnknownUnit(String),

    /// The unit could not start an external process
    #[error("cannot start '{program}': {source}")]
    Spawn {
        /// Program as resolved
        program: String,
        /// Why spawning failed
        #[source]
        source: std::io::Error,
    },

    /// IO failure inside the unit
    #[error("{context}: {source}")]
    Io {
        /// What the unit was doing
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The unit produced an undecodable sketch stream
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The unit built an invalid specification
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// Unit-specific failure
    #[error("{0}")]
    Failed(String),
}

impl UnitError {
    /// Create IO error with context
    pub fn io_error(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors that stop a stage
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// `start` was called more than once
    #[error("stage '{stage}' has already been started")]
    AlreadyStarted {
        /// Stage name
        stage: String,
    },

    /// Two specifications with the same name were scheduled
    #[error("spec '{name}' already scheduled in stage '{stage}'")]
    DuplicateSpec {
        /// Stage name
        stage: String,
        /// Duplicated specification name
        name: String,
    },

    /// The cache entry of a specification cannot be trusted
    #[error("cache of spec '{spec}' is unusable: {source}")]
    Store {
        /// Specification whose entry failed
        spec: String,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// The stage directory cannot be resolved
    #[error("invalid stage directory {}: {source}", .path.display())]
    StageDir {
        /// Directory as given
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Errors creating the worker pool
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Parallelism must be at least one
    #[error("worker pool needs at least one thread")]
    NoThreads,

    /// The thread pool could not be built
    #[error("cannot build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}
