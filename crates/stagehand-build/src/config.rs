//! Build configuration
//!
//! Settings come from defaults, an optional TOML file and command-line
//! overrides, in that order:
//!
//! ```toml
//! build_dir = "build"
//! store_dir = "build/.cache"
//! parallelism = 8
//! stage_file = "stage.yml"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

/// Directory below the build directory holding the default store
pub const STORE_SUBDIR: &str = ".stagehand/actions";

/// Build configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Directory whose subdirectories are the stages
    pub build_dir: PathBuf,
    /// Root of the action store; defaults below the build directory
    pub store_dir: Option<PathBuf>,
    /// Worker threads shared by all stages; defaults to available cores
    pub parallelism: Option<usize>,
    /// Stage file the bootstrap unit reads in every stage
    pub stage_file: String,
}

impl BuildConfig {
    /// Create configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the build directory
    #[inline]
    #[must_use]
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    /// Set the store root
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Set the number of worker threads
    #[inline]
    #[must_use]
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }

    /// Set the stage file name
    #[inline]
    #[must_use]
    pub fn with_stage_file(mut self, file: impl Into<String>) -> Self {
        self.stage_file = file.into();
        self
    }

    /// Store root actually used
    #[must_use]
    pub fn effective_store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| self.build_dir.join(STORE_SUBDIR))
    }

    /// Worker threads actually used
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get))
    }

    /// Check values that deserialization cannot
    ///
    /// # Errors
    /// Returns error for zero parallelism or an empty stage file name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == Some(0) {
            return Err(ConfigError::Invalid("parallelism must be at least 1".to_string()));
        }
        if self.stage_file.trim().is_empty() {
            return Err(ConfigError::Invalid("stage_file must not be empty".to_string()));
        }
        Ok(())
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid configuration
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("."),
            store_dir: None,
            parallelism: None,
            stage_file: stagehand_units::DEFAULT_STAGE_FILE.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        /// Config file
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A config value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}
