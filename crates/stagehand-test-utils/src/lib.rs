//! Testing utilities for the Stagehand workspace
//!
//! Shared fixtures: scripted units, a recording message sink and scratch
//! build trees.

#![allow(missing_docs)]

use dashmap::DashMap;
use filetime::{set_file_mtime, FileTime};
use parking_lot::Mutex;
use stagehand_action::{MessageLevel, Sketch, Specification};
use stagehand_stage::{
    ActionRecorder, MessageSink, Unit, UnitContext, UnitError, UnitRegistry, WorkerPool,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Unit type served by [`ScriptBook`]
pub const SCRIPTED: &str = "scripted";

/// One step of a scripted unit
#[derive(Debug, Clone)]
pub enum Step {
    /// Record the sketch as-is
    Record(Sketch),
    /// Write a file below the stage directory, then record the write
    Write { path: String, content: String },
    /// Return a unit error
    Fail(String),
    /// Panic inside the unit
    Panic(String),
}

/// Specification served by the scripted unit
pub fn scripted_spec(name: &str) -> Specification {
    scripted_spec_with_params(name, &[])
}

pub fn scripted_spec_with_params(name: &str, params: &[&str]) -> Specification {
    Specification::builder(SCRIPTED)
        .name(name)
        .params(params.iter().copied())
        .build()
        .unwrap()
}

/// Scripts for scripted units, keyed by specification name, plus run counters
#[derive(Debug, Clone, Default)]
pub struct ScriptBook {
    scripts: Arc<DashMap<String, Vec<Step>>>,
    runs: Arc<DashMap<String, usize>>,
}

impl ScriptBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the script of `name`
    pub fn script(&self, name: &str, steps: Vec<Step>) -> &Self {
        self.scripts.insert(name.to_string(), steps);
        self
    }

    /// How often the unit of `name` actually executed
    pub fn runs(&self, name: &str) -> usize {
        self.runs.get(name).map_or(0, |count| *count)
    }

    /// Executions across all names
    pub fn total_runs(&self) -> usize {
        self.runs.iter().map(|entry| *entry.value()).sum()
    }

    /// Registry serving [`SCRIPTED`] specifications from this book
    pub fn registry(&self) -> UnitRegistry {
        let book = self.clone();
        UnitRegistry::new().with(SCRIPTED, move |spec: &Specification| -> Result<Box<dyn Unit>, UnitError> {
            let steps = book
                .scripts
                .get(spec.name())
                .map(|steps| steps.clone())
                .unwrap_or_default();
            Ok(Box::new(ScriptedUnit {
                steps,
                runs: Arc::clone(&book.runs),
            }))
        })
    }
}

struct ScriptedUnit {
    steps: Vec<Step>,
    runs: Arc<DashMap<String, usize>>,
}

impl Unit for ScriptedUnit {
    fn execute(&mut self, ctx: &UnitContext, recorder: &mut ActionRecorder<'_>) -> Result<(), UnitError> {
        *self.runs.entry(ctx.spec().name().to_string()).or_insert(0) += 1;
        for step in self.steps.drain(..) {
            match step {
                Step::Record(sketch) => recorder.record(sketch),
                Step::Write { path, content } => {
                    let target = ctx.stage_dir().join(&path);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent).map_err(|err| UnitError::io_error("mkdir", err))?;
                    }
                    fs::write(&target, content).map_err(|err| UnitError::io_error("write", err))?;
                    recorder.write_file(path);
                }
                Step::Fail(message) => return Err(UnitError::Failed(message)),
                Step::Panic(message) => panic!("{message}"),
            }
        }
        Ok(())
    }
}

/// A message as received by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub level: MessageLevel,
    pub message: String,
    pub location: Option<String>,
}

/// Sink that keeps everything it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<RecordedMessage>>,
    progress: Mutex<Vec<f64>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages.lock().clone()
    }

    pub fn at_level(&self, level: MessageLevel) -> Vec<RecordedMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.level == level)
            .cloned()
            .collect()
    }

    pub fn contains(&self, level: MessageLevel, text: &str) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|m| m.level == level && m.message.contains(text))
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
        self.progress.lock().clear();
    }
}

impl MessageSink for RecordingSink {
    fn message(&self, level: MessageLevel, message: &str, location: Option<&str>) {
        self.messages.lock().push(RecordedMessage {
            level,
            message: message.to_string(),
            location: location.map(str::to_string),
        });
    }

    fn progress(&self, fraction: f64, _description: &str) {
        self.progress.lock().push(fraction);
    }
}

/// Scratch build directory
#[derive(Debug)]
pub struct TempBuild {
    root: TempDir,
}

impl TempBuild {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Create (if needed) and return a stage directory
    pub fn stage(&self, name: &str) -> PathBuf {
        let dir = self.root().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Default store root below the build directory
    pub fn store_root(&self) -> PathBuf {
        self.root().join(".stagehand").join("actions")
    }

    pub fn stage_store(&self, stage: &str) -> PathBuf {
        self.store_root().join(stage)
    }

    /// Write a file relative to the build root
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Pin a file's modification time
    pub fn set_mtime(&self, relative: &str, unix_seconds: i64) {
        set_file_mtime(self.root().join(relative), FileTime::from_unix_time(unix_seconds, 0)).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).unwrap()
    }
}

impl Default for TempBuild {
    fn default() -> Self {
        Self::new()
    }
}

pub fn pool(threads: usize) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(threads).unwrap())
}
