//! Action intake
//!
//! One [`IntakeProcessor`] consumes the sketch stream of a single unit
//! execution, live or replayed from the cache. It records every sketch,
//! feeds filesystem accesses to the stage's collision detector, collects
//! nested specifications, forwards messages and enforces exit-code
//! consistency.

use crate::message::MessageSink;
use crate::profile::UnitProfiler;
use parking_lot::Mutex;
use stagehand_action::{DirectoryMode, FileMode, MessageLevel, Sketch, Specification};
use stagehand_paths::{normalize, CollisionDetector, DetectorError, Operation, OperationType, SegmentPath};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Processing error for sketches arriving after an exit code
pub const ACTION_AFTER_EXIT: &str =
    "no further actions shall be recorded after an explicit exit code has been set";

/// Processing error for a zero exit code following a fatal message
pub const ZERO_EXIT_AFTER_FATAL: &str =
    "exit code cannot be zero while there are fatal errors reported";

/// Operation type for a file access mode
#[must_use]
pub fn file_operation(mode: FileMode) -> OperationType {
    match mode {
        FileMode::Create => OperationType::FileCreate,
        FileMode::Delete => OperationType::PathDelete,
        FileMode::Read => OperationType::ContentRead,
        FileMode::Write => OperationType::ContentWrite,
        FileMode::CheckExistence => OperationType::PathCheck,
    }
}

/// Operation type for a directory access mode
#[must_use]
pub fn directory_operation(mode: DirectoryMode) -> OperationType {
    match mode {
        DirectoryMode::Create => OperationType::DirCreate,
        DirectoryMode::Delete => OperationType::PathDelete,
        DirectoryMode::List => OperationType::DirList,
        DirectoryMode::CheckExistence => OperationType::PathCheck,
    }
}

/// Everything an execution produced, once its stream is exhausted
#[derive(Debug, Clone, Default)]
pub struct IntakeOutcome {
    /// Every accepted sketch, in order
    pub recorded: Vec<Sketch>,
    /// Nested specifications requested through Exec
    pub invocations: Vec<Specification>,
    /// Non-fatal consistency violations
    pub processing_errors: Vec<String>,
    /// Explicit exit code, if any
    pub exit_code: Option<i32>,
    /// Whether a FATAL message was seen
    pub has_fatal: bool,
}

/// Consumer of one execution's sketch stream
pub struct IntakeProcessor {
    spec_name: String,
    stage_dir: PathBuf,
    detector: Arc<Mutex<CollisionDetector>>,
    sink: Arc<dyn MessageSink>,
    outcome: IntakeOutcome,
    collision_reported: bool,
    profiler: UnitProfiler,
}

impl std::fmt::Debug for IntakeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeProcessor")
            .field("spec_name", &self.spec_name)
            .field("stage_dir", &self.stage_dir)
            .field("outcome", &self.outcome)
            .field("collision_reported", &self.collision_reported)
            .finish_non_exhaustive()
    }
}

impl IntakeProcessor {
    /// Create processor for the computation `spec_name`
    #[must_use]
    pub fn new(
        spec_name: impl Into<String>,
        stage_dir: impl Into<PathBuf>,
        detector: Arc<Mutex<CollisionDetector>>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            spec_name: spec_name.into(),
            stage_dir: stage_dir.into(),
            detector,
            sink,
            outcome: IntakeOutcome::default(),
            collision_reported: false,
            profiler: UnitProfiler::default(),
        }
    }

    /// Report messages to `profiler` as well
    #[must_use]
    pub fn with_profiler(mut self, profiler: UnitProfiler) -> Self {
        self.profiler = profiler;
        self
    }

    /// Name of the computation whose stream is consumed
    #[inline]
    #[must_use]
    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    /// Whether a FATAL message has been seen so far
    #[inline]
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.outcome.has_fatal
    }

    /// Consume one sketch
    pub fn accept(&mut self, sketch: Sketch) {
        self.outcome.recorded.push(sketch.clone());

        if self.outcome.exit_code.is_some() {
            self.outcome.processing_errors.push(ACTION_AFTER_EXIT.to_string());
        }

        match sketch {
            Sketch::Exec { spec } => self.outcome.invocations.push(spec),
            Sketch::FileAccess { path, mode } => {
                self.check_access(&path, file_operation(mode), "file", &mode.to_string());
            }
            Sketch::DirectoryAccess { path, mode, .. } => {
                self.check_access(&path, directory_operation(mode), "directory", &mode.to_string());
            }
            Sketch::Exit { exit_code } => {
                self.outcome.exit_code = Some(exit_code);
                if exit_code == 0 && self.outcome.has_fatal {
                    self.outcome
                        .processing_errors
                        .push(ZERO_EXIT_AFTER_FATAL.to_string());
                }
            }
            Sketch::MessageOutput {
                level,
                message,
                location,
            } => {
                if level == MessageLevel::Fatal {
                    self.outcome.has_fatal = true;
                }
                let location = match location {
                    Some(inner) => format!("{} ({inner})", self.spec_name),
                    None => self.spec_name.clone(),
                };
                self.sink.message(level, &message, Some(&location));
                self.profiler.on_message(level, &message);
            }
        }
    }

    /// Finish consumption
    #[must_use]
    pub fn finish(self) -> IntakeOutcome {
        self.outcome
    }

    fn check_access(&mut self, path: &Path, kind: OperationType, what: &str, mode: &str) {
        if self.collision_reported {
            return;
        }

        let absolute = normalize(&self.stage_dir.join(path));
        let result = SegmentPath::from_path(&absolute)
            .map_err(DetectorError::from)
            .and_then(|segments| {
                let op = Operation::described(kind, segments, self.spec_name.clone());
                self.detector.lock().check_and_record(op)
            });

        let message = match result {
            Ok(()) => return,
            Err(DetectorError::Collision { offending }) => format!(
                "Our {what} access with mode '{mode}' at path '{}' offends operation from '{}': {}",
                absolute.display(),
                offending.owner(),
                offending.reason()
            ),
            Err(err) => format!(
                "Our {what} access with mode '{mode}' at path '{}' cannot be checked: {err}",
                absolute.display()
            ),
        };

        self.collision_reported = true;
        self.accept(Sketch::message(MessageLevel::Fatal, message));
    }
}
