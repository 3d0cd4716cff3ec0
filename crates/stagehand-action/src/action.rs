//! Actions and sketches
//!
//! A [`Sketch`] is what a unit reports while it runs: stage-relative paths,
//! no fingerprints. An [`Action`] is the persisted form: store-relative
//! paths plus the fingerprint captured when the sketch was converted.
//! The two convert into each other through a [`PathMapping`].

use crate::error::ActionError;
use crate::fingerprint::{compile_pattern, directory_fingerprint, file_fingerprint, DEFAULT_PATTERN};
use crate::level::MessageLevel;
use crate::mapping::PathMapping;
use crate::spec::Specification;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

/// How a unit accessed a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileMode {
    /// Contents were read
    Read,
    /// Contents were written
    Write,
    /// The file was created
    Create,
    /// The file was removed
    Delete,
    /// Only existence was checked
    CheckExistence,
}

impl Display for FileMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::CheckExistence => "CHECK_EXISTENCE",
        };
        f.write_str(name)
    }
}

/// How a unit accessed a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectoryMode {
    /// Direct children were listed
    List,
    /// The directory was created
    Create,
    /// The directory tree was removed
    Delete,
    /// Only existence was checked
    CheckExistence,
}

impl Display for DirectoryMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "LIST",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::CheckExistence => "CHECK_EXISTENCE",
        };
        f.write_str(name)
    }
}

/// Persisted side effect of a computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    /// File access with the fingerprint observed at capture time
    FileAccess {
        /// Store-relative path
        path: PathBuf,
        /// Access mode
        mode: FileMode,
        /// Fingerprint at capture time
        stat: String,
    },
    /// Directory access; `pattern` filters the listed names
    DirectoryAccess {
        /// Store-relative path
        path: PathBuf,
        /// Glob over direct child names
        pattern: String,
        /// Access mode
        mode: DirectoryMode,
        /// Fingerprint at capture time
        stat: String,
    },
    /// Request for a nested computation
    Exec {
        /// Nested specification
        spec: Specification,
    },
    /// Explicit exit code
    Exit {
        /// Code reported by the unit
        exit_code: i32,
    },
    /// Diagnostic output
    #[serde(rename = "message")]
    MessageOutput {
        /// Severity
        level: MessageLevel,
        /// Message text
        message: String,
        /// Unit-specific location, such as `file:line`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
}

impl Action {
    /// Re-probe the filesystem and compare against the captured fingerprint
    ///
    /// Exec, Exit and messages are always up to date.
    ///
    /// # Errors
    /// Returns error if a file cannot be probed or the pattern is invalid
    pub fn is_up_to_date(&self, mapping: &PathMapping) -> Result<bool, ActionError> {
        match self {
            Self::FileAccess { path, stat, .. } => {
                let current = file_fingerprint(&mapping.resolve_from_store(path))?;
                Ok(&current == stat)
            }
            Self::DirectoryAccess {
                path, pattern, stat, ..
            } => {
                let pattern = compile_pattern(pattern)?;
                let current = directory_fingerprint(&mapping.resolve_from_store(path), &pattern);
                Ok(&current == stat)
            }
            Self::Exec { .. } | Self::Exit { .. } | Self::MessageOutput { .. } => Ok(true),
        }
    }

    /// Drop the fingerprint and re-root paths at the stage directory
    ///
    /// # Errors
    /// Returns error if a path cannot be mapped back to the stage
    pub fn to_sketch(&self, mapping: &PathMapping) -> Result<Sketch, ActionError> {
        Ok(match self {
            Self::FileAccess { path, mode, .. } => Sketch::FileAccess {
                path: mapping.store_to_stage(path)?,
                mode: *mode,
            },
            Self::DirectoryAccess {
                path, pattern, mode, ..
            } => Sketch::DirectoryAccess {
                path: mapping.store_to_stage(path)?,
                pattern: Some(pattern.clone()),
                mode: *mode,
            },
            Self::Exec { spec } => Sketch::Exec { spec: spec.clone() },
            Self::Exit { exit_code } => Sketch::Exit {
                exit_code: *exit_code,
            },
            Self::MessageOutput {
                level,
                message,
                location,
            } => Sketch::MessageOutput {
                level: *level,
                message: message.clone(),
                location: location.clone(),
            },
        })
    }
}

/// Side effect as reported by a running unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Sketch {
    /// File access
    FileAccess {
        /// Path, relative to the stage directory or absolute
        path: PathBuf,
        /// Access mode
        mode: FileMode,
    },
    /// Directory access
    DirectoryAccess {
        /// Path, relative to the stage directory or absolute
        path: PathBuf,
        /// Glob over direct child names; all names when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        /// Access mode
        mode: DirectoryMode,
    },
    /// Request for a nested computation in the same stage
    Exec {
        /// Nested specification
        spec: Specification,
    },
    /// Explicit exit code
    Exit {
        /// Code reported by the unit
        exit_code: i32,
    },
    /// Diagnostic output
    #[serde(rename = "message")]
    MessageOutput {
        /// Severity
        level: MessageLevel,
        /// Message text
        message: String,
        /// Unit-specific location, such as `file:line`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
}

impl Sketch {
    /// File access sketch
    #[must_use]
    pub fn file(path: impl Into<PathBuf>, mode: FileMode) -> Self {
        Self::FileAccess {
            path: path.into(),
            mode,
        }
    }

    /// Directory access sketch using the default pattern
    #[must_use]
    pub fn directory(path: impl Into<PathBuf>, mode: DirectoryMode) -> Self {
        Self::DirectoryAccess {
            path: path.into(),
            pattern: None,
            mode,
        }
    }

    /// Message sketch without location
    #[must_use]
    pub fn message(level: MessageLevel, message: impl Into<String>) -> Self {
        Self::MessageOutput {
            level,
            message: message.into(),
            location: None,
        }
    }

    /// Path the sketch touches, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::FileAccess { path, .. } | Self::DirectoryAccess { path, .. } => Some(path),
            Self::Exec { .. } | Self::Exit { .. } | Self::MessageOutput { .. } => None,
        }
    }

    /// Capture the current fingerprint and re-root paths at the store directory
    ///
    /// Directory accesses without a pattern store [`DEFAULT_PATTERN`].
    ///
    /// # Errors
    /// Returns error if a file cannot be probed, the pattern is invalid, or
    /// the path cannot be mapped into the store
    pub fn to_action(&self, mapping: &PathMapping) -> Result<Action, ActionError> {
        Ok(match self {
            Self::FileAccess { path, mode } => Action::FileAccess {
                stat: file_fingerprint(&mapping.resolve_from_stage(path))?,
                path: mapping.stage_to_store(path)?,
                mode: *mode,
            },
            Self::DirectoryAccess {
                path,
                pattern,
                mode,
            } => {
                let pattern = pattern.as_deref().unwrap_or(DEFAULT_PATTERN);
                let compiled = compile_pattern(pattern)?;
                Action::DirectoryAccess {
                    stat: directory_fingerprint(&mapping.resolve_from_stage(path), &compiled),
                    path: mapping.stage_to_store(path)?,
                    pattern: pattern.to_string(),
                    mode: *mode,
                }
            }
            Self::Exec { spec } => Action::Exec { spec: spec.clone() },
            Self::Exit { exit_code } => Action::Exit {
                exit_code: *exit_code,
            },
            Self::MessageOutput {
                level,
                message,
                location,
            } => Action::MessageOutput {
                level: *level,
                message: message.clone(),
                location: location.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;

    fn workspace() -> (tempfile::TempDir, PathMapping) {
        let root = tempfile::tempdir().unwrap();
        let stage = root.path().join("stage");
        let store = root.path().join(".store").join("stage");
        fs::create_dir_all(&stage).unwrap();
        let mapping = PathMapping::new(&stage, &store);
        (root, mapping)
    }

    #[test]
    fn file_action_goes_stale_on_mtime_change() {
        let (_root, mapping) = workspace();
        let file = mapping.stage_dir().join("x.txt");
        fs::write(&file, "x").unwrap();
        set_file_mtime(&file, FileTime::from_unix_time(1_000, 0)).unwrap();

        let action = Sketch::file("x.txt", FileMode::Read).to_action(&mapping).unwrap();
        assert!(action.is_up_to_date(&mapping).unwrap());

        set_file_mtime(&file, FileTime::from_unix_time(2_000, 0)).unwrap();
        assert!(!action.is_up_to_date(&mapping).unwrap());
    }

    #[test]
    fn missing_file_becomes_stale_when_created() {
        let (_root, mapping) = workspace();
        let action = Sketch::file("later.txt", FileMode::CheckExistence)
            .to_action(&mapping)
            .unwrap();
        assert!(action.is_up_to_date(&mapping).unwrap());

        fs::write(mapping.stage_dir().join("later.txt"), "").unwrap();
        assert!(!action.is_up_to_date(&mapping).unwrap());
    }

    #[test]
    fn directory_action_stores_effective_pattern() {
        let (_root, mapping) = workspace();
        let action = Sketch::directory(".", DirectoryMode::List)
            .to_action(&mapping)
            .unwrap();
        let Action::DirectoryAccess { pattern, .. } = &action else {
            panic!("expected directory access, got {action:?}");
        };
        assert_eq!(pattern, DEFAULT_PATTERN);

        let sketch = action.to_sketch(&mapping).unwrap();
        assert_eq!(
            sketch,
            Sketch::DirectoryAccess {
                path: PathBuf::from("."),
                pattern: Some(DEFAULT_PATTERN.to_string()),
                mode: DirectoryMode::List,
            }
        );
    }

    #[test]
    fn directory_action_goes_stale_on_new_entry() {
        let (_root, mapping) = workspace();
        let action = Sketch::directory(".", DirectoryMode::List)
            .to_action(&mapping)
            .unwrap();
        fs::write(mapping.stage_dir().join("new.txt"), "").unwrap();
        assert!(!action.is_up_to_date(&mapping).unwrap());
    }

    #[test]
    fn file_sketch_maps_back_to_stage_path() {
        let (_root, mapping) = workspace();
        let sketch = Sketch::file("out/y.bin", FileMode::Write);
        let action = sketch.to_action(&mapping).unwrap();
        assert_eq!(action.to_sketch(&mapping).unwrap(), sketch);
    }

    #[test]
    fn non_path_actions_are_always_up_to_date() {
        let (_root, mapping) = workspace();
        let exit = Sketch::Exit { exit_code: 3 }.to_action(&mapping).unwrap();
        let msg = Sketch::message(MessageLevel::Info, "hi")
            .to_action(&mapping)
            .unwrap();
        assert!(exit.is_up_to_date(&mapping).unwrap());
        assert!(msg.is_up_to_date(&mapping).unwrap());
    }

    #[test]
    fn action_yaml_uses_type_tags() {
        let action = Action::MessageOutput {
            level: MessageLevel::Warn,
            message: "careful".to_string(),
            location: None,
        };
        let yaml = serde_yaml::to_string(&action).unwrap();
        assert!(yaml.contains("type: message"));
        assert!(yaml.contains("level: WARN"));

        let exit = serde_yaml::to_string(&Action::Exit { exit_code: 2 }).unwrap();
        assert!(exit.contains("type: exit"));
        assert!(exit.contains("exitCode: 2"));
    }
}
