//! Unit contract
//!
//! A unit is the implementation behind a specification. It runs once per
//! fresh execution and reports every observable side effect through an
//! [`ActionRecorder`]. Units are looked up by the specification's unit type
//! in a [`UnitRegistry`].

use crate::error::UnitError;
use crate::intake::IntakeProcessor;
use crate::profile::UnitProfiler;
use stagehand_action::{DirectoryMode, FileMode, MessageLevel, Sketch, Specification};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Computation implementation
pub trait Unit: Send {
    /// Run the computation, recording its side effects
    ///
    /// # Errors
    /// Returns error if the computation fails; the stage reports it as fatal
    fn execute(&mut self, ctx: &UnitContext, recorder: &mut ActionRecorder<'_>) -> Result<(), UnitError>;
}

/// Read-only facts a unit runs with
#[derive(Debug, Clone)]
pub struct UnitContext {
    spec: Specification,
    stage_name: String,
    stage_dir: PathBuf,
    profiler: UnitProfiler,
}

impl UnitContext {
    /// Create context
    #[must_use]
    pub fn new(spec: Specification, stage_name: impl Into<String>, stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            stage_name: stage_name.into(),
            stage_dir: stage_dir.into(),
            profiler: UnitProfiler::default(),
        }
    }

    /// Attach the computation's profiler
    #[must_use]
    pub fn with_profiler(mut self, profiler: UnitProfiler) -> Self {
        self.profiler = profiler;
        self
    }

    /// Specification being executed
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    /// Name of the enclosing stage
    #[inline]
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Working directory; sketch paths are relative to it
    #[inline]
    #[must_use]
    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    /// Profiler of this computation, for unit-specific events
    #[inline]
    #[must_use]
    pub fn profiler(&self) -> &UnitProfiler {
        &self.profiler
    }
}

/// Typed front-end over the intake processor
#[derive(Debug)]
pub struct ActionRecorder<'a> {
    intake: &'a mut IntakeProcessor,
}

impl<'a> ActionRecorder<'a> {
    /// Wrap an intake processor
    #[must_use]
    pub fn new(intake: &'a mut IntakeProcessor) -> Self {
        Self { intake }
    }

    /// Record an arbitrary sketch
    pub fn record(&mut self, sketch: Sketch) {
        self.intake.accept(sketch);
    }

    fn file(&mut self, path: impl Into<PathBuf>, mode: FileMode) {
        self.record(Sketch::file(path, mode));
    }

    fn directory(&mut self, path: impl Into<PathBuf>, mode: DirectoryMode) {
        self.record(Sketch::directory(path, mode));
    }

    /// Record that file contents were read
    pub fn read_file(&mut self, path: impl Into<PathBuf>) {
        self.file(path, FileMode::Read);
    }

    /// Record that file contents were written
    pub fn write_file(&mut self, path: impl Into<PathBuf>) {
        self.file(path, FileMode::Write);
    }

    /// Record that a file was created
    pub fn create_file(&mut self, path: impl Into<PathBuf>) {
        self.file(path, FileMode::Create);
    }

    /// Record that a file was removed
    pub fn delete_file(&mut self, path: impl Into<PathBuf>) {
        self.file(path, FileMode::Delete);
    }

    /// Record that a file's existence was checked
    pub fn check_file_exists(&mut self, path: impl Into<PathBuf>) {
        self.file(path, FileMode::CheckExistence);
    }

    /// Record a listing of direct children matching `pattern`
    pub fn list_directory(&mut self, path: impl Into<PathBuf>, pattern: Option<&str>) {
        self.record(Sketch::DirectoryAccess {
            path: path.into(),
            pattern: pattern.map(str::to_string),
            mode: DirectoryMode::List,
        });
    }

    /// Record that a directory was created
    pub fn create_directory(&mut self, path: impl Into<PathBuf>) {
        self.directory(path, DirectoryMode::Create);
    }

    /// Record that a directory tree was removed
    pub fn delete_directory(&mut self, path: impl Into<PathBuf>) {
        self.directory(path, DirectoryMode::Delete);
    }

    /// Record that a directory's existence was checked
    pub fn check_directory_exists(&mut self, path: impl Into<PathBuf>) {
        self.directory(path, DirectoryMode::CheckExistence);
    }

    /// Request a nested computation in the same stage
    pub fn exec(&mut self, spec: Specification) {
        self.record(Sketch::Exec { spec });
    }

    /// Record an explicit exit code
    pub fn exit(&mut self, exit_code: i32) {
        self.record(Sketch::Exit { exit_code });
    }

    /// Record a message at `level`
    pub fn message(&mut self, level: MessageLevel, message: impl Into<String>) {
        self.record(Sketch::message(level, message));
    }

    /// Record a FATAL message, failing the computation
    pub fn fatal(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Fatal, message);
    }

    /// Record an ERROR message
    pub fn error(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Error, message);
    }

    /// Record a WARN message
    pub fn warn(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Warn, message);
    }

    /// Record an INFO message
    pub fn info(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Info, message);
    }

    /// Whether a FATAL message has been recorded
    #[inline]
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.intake.has_fatal()
    }
}

/// Creates units for specifications of one unit type
pub trait UnitFactory: Send + Sync {
    /// Create the unit for `spec`
    ///
    /// # Errors
    /// Returns error if the specification cannot be served
    fn create(&self, spec: &Specification) -> Result<Box<dyn Unit>, UnitError>;
}

impl<F> UnitFactory for F
where
    F: Fn(&Specification) -> Result<Box<dyn Unit>, UnitError> + Send + Sync,
{
    fn create(&self, spec: &Specification) -> Result<Box<dyn Unit>, UnitError> {
        self(spec)
    }
}

/// Unit types known to a build
#[derive(Default, Clone)]
pub struct UnitRegistry {
    factories: HashMap<String, Arc<dyn UnitFactory>>,
}

impl fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("UnitRegistry").field("types", &types).finish()
    }
}

impl UnitRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for `unit_type`
    pub fn register(&mut self, unit_type: impl Into<String>, factory: impl UnitFactory + 'static) {
        self.factories.insert(unit_type.into(), Arc::new(factory));
    }

    /// Builder-style [`UnitRegistry::register`]
    #[must_use]
    pub fn with(mut self, unit_type: impl Into<String>, factory: impl UnitFactory + 'static) -> Self {
        self.register(unit_type, factory);
        self
    }

    /// Whether a unit type is known
    #[inline]
    #[must_use]
    pub fn contains(&self, unit_type: &str) -> bool {
        self.factories.contains_key(unit_type)
    }

    /// Create the unit for `spec`
    ///
    /// # Errors
    /// Returns [`UnitError::UnknownUnit`] for unregistered types, or the factory's error
    pub fn create(&self, spec: &Specification) -> Result<Box<dyn Unit>, UnitError> {
        let factory = self
            .factories
            .get(spec.unit())
            .ok_or_else(|| UnitError::UnknownUnit(spec.unit().to_string()))?;
        factory.create(spec)
    }
}
