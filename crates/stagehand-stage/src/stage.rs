//! Stage scheduler
//!
//! A stage runs a dynamically discovered set of computations in one working
//! directory. Starting it schedules the initial specification; every
//! finished computation may request nested ones, which are scheduled in turn
//! until nothing is outstanding.
//!
//! The scheduling state (scheduled names, outstanding count) lives in the
//! thread that called [`Stage::start`]. Worker tasks report back over a
//! channel, so only the collision detector is shared between running
//! computations.

use crate::error::StageError;
use crate::intake::{IntakeOutcome, IntakeProcessor};
use crate::message::MessageSink;
use crate::pool::WorkerPool;
use crate::profile::{Profiler, StageProfiler, UnitProfiler};
use crate::unit::{ActionRecorder, UnitContext, UnitRegistry};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use stagehand_action::{ActionStore, MessageLevel, Specification};
use stagehand_paths::{normalize, CollisionDetector};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifecycle of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Created, `start` not yet called
    NotStarted,
    /// Inside `start`
    Running,
    /// `start` returned
    Finished,
}

/// Outcome of one stage run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Computations that ran their unit
    pub executed: Vec<String>,
    /// Computations replayed from the cache
    pub replayed: Vec<String>,
    /// Computations that reported a fatal error
    pub failed: Vec<String>,
    /// Waiting stopped early through a [`StageInterrupter`]
    pub interrupted: bool,
}

impl StageReport {
    /// Total computations that completed
    #[inline]
    #[must_use]
    pub fn completed(&self) -> usize {
        self.executed.len() + self.replayed.len()
    }
}

/// Handle that stops a running [`Stage::start`] from waiting
///
/// In-flight computations are not cancelled. An interrupt sent before the
/// stage starts ends its first wait.
#[derive(Debug, Clone)]
pub struct StageInterrupter {
    sender: Sender<Event>,
}

impl StageInterrupter {
    /// Stop waiting for outstanding computations
    pub fn interrupt(&self) {
        let _ = self.sender.send(Event::Interrupt);
    }
}

#[derive(Debug)]
enum Event {
    Completed {
        name: String,
        result: Result<Completion, StageError>,
    },
    Interrupt,
}

#[derive(Debug, Default)]
struct Completion {
    replayed: bool,
    failed: bool,
    nested: Vec<Specification>,
}

impl Completion {
    fn failure(replayed: bool) -> Self {
        Self {
            replayed,
            failed: true,
            nested: Vec::new(),
        }
    }
}

/// State shared with worker tasks
struct Shared {
    stage_name: String,
    stage_dir: PathBuf,
    store: ActionStore,
    registry: Arc<UnitRegistry>,
    sink: Arc<dyn MessageSink>,
    detector: Arc<Mutex<CollisionDetector>>,
}

impl Shared {
    fn fatal(&self, spec: &Specification, message: &str) {
        self.sink
            .message(MessageLevel::Fatal, message, Some(spec.name()));
    }

    fn emit_processing_errors(&self, spec: &Specification, outcome: &IntakeOutcome) {
        for error in &outcome.processing_errors {
            self.sink.message(MessageLevel::Error, error, Some(spec.name()));
        }
    }

    fn intake(&self, spec: &Specification, profiler: &UnitProfiler) -> IntakeProcessor {
        IntakeProcessor::new(
            spec.name(),
            &self.stage_dir,
            Arc::clone(&self.detector),
            Arc::clone(&self.sink),
        )
        .with_profiler(profiler.clone())
    }

    fn run(&self, spec: &Specification, profiler: &UnitProfiler) -> Result<Completion, StageError> {
        let span = tracing::debug_span!("unit", spec = spec.name());
        let _guard = span.enter();
        let _execution = profiler.wrap_execution();

        let loaded = {
            let _load = profiler.wrap_load();
            self.store.load(spec)
        };
        match loaded {
            Ok(Some(entry)) => {
                tracing::debug!(actions = entry.sketches.len(), "replaying");
                let mut intake = self.intake(spec, profiler);
                for sketch in entry.sketches {
                    intake.accept(sketch);
                }
                let outcome = intake.finish();
                self.emit_processing_errors(spec, &outcome);
                return Ok(Completion {
                    replayed: true,
                    failed: outcome.has_fatal,
                    nested: outcome.invocations,
                });
            }
            Ok(None) => {}
            Err(source) if source.is_fatal_for_build() => {
                return Err(StageError::Store {
                    spec: spec.name().to_string(),
                    source,
                });
            }
            Err(err) => {
                self.fatal(spec, &format!("cannot validate cached actions: {err}"));
                return Ok(Completion::failure(false));
            }
        }

        tracing::debug!("executing");
        let ctx = UnitContext::new(spec.clone(), &self.stage_name, &self.stage_dir)
            .with_profiler(profiler.clone());
        let mut intake = self.intake(spec, profiler);
        let executed = {
            let _run = profiler.wrap_run();
            self.registry.create(spec).and_then(|mut unit| {
                let mut recorder = ActionRecorder::new(&mut intake);
                unit.execute(&ctx, &mut recorder)
            })
        };
        let outcome = intake.finish();
        self.emit_processing_errors(spec, &outcome);

        if let Err(err) = executed {
            self.fatal(spec, &format!("computation failed: {err}"));
            return Ok(Completion::failure(false));
        }

        let mut failed = outcome.has_fatal;
        let written = {
            let _write = profiler.wrap_write();
            self.store.write(spec, &outcome.recorded)
        };
        if let Err(err) = written {
            self.fatal(spec, &format!("cannot persist actions: {err}"));
            failed = true;
        }

        Ok(Completion {
            replayed: false,
            failed,
            nested: outcome.invocations,
        })
    }
}

/// Scheduling state of one `start` call
#[derive(Default)]
struct Run {
    scheduled: HashSet<String>,
    outstanding: usize,
    completed: usize,
    report: StageReport,
    abort: Option<StageError>,
}

/// Scheduler for one stage directory
pub struct Stage {
    shared: Arc<Shared>,
    pool: Arc<WorkerPool>,
    profiler: StageProfiler,
    state: Mutex<StageState>,
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.shared.stage_name)
            .field("dir", &self.shared.stage_dir)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl Stage {
    /// Create stage `name` working in `dir`, caching under `store_dir`
    ///
    /// Relative directories are resolved against the current directory.
    ///
    /// # Errors
    /// Returns error if the current directory is needed but unavailable
    pub fn new(
        name: impl Into<String>,
        dir: impl AsRef<Path>,
        store_dir: impl AsRef<Path>,
        registry: Arc<UnitRegistry>,
        pool: Arc<WorkerPool>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self, StageError> {
        let name = name.into();
        let dir = absolute(dir.as_ref())?;
        let store_dir = absolute(store_dir.as_ref())?;
        let (sender, receiver) = channel::unbounded();

        Ok(Self {
            profiler: Profiler::default().stage(&name),
            shared: Arc::new(Shared {
                stage_name: name,
                store: ActionStore::new(&dir, &store_dir),
                stage_dir: dir,
                registry,
                sink,
                detector: Arc::new(Mutex::new(CollisionDetector::new())),
            }),
            pool,
            state: Mutex::new(StageState::NotStarted),
            sender,
            receiver,
        })
    }

    /// Report profiling events through `profiler`
    #[must_use]
    pub fn with_profiler(mut self, profiler: &Profiler) -> Self {
        self.profiler = profiler.stage(self.name());
        self
    }

    /// Stage name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.stage_name
    }

    /// Absolute working directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.shared.stage_dir
    }

    /// Action cache of this stage
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ActionStore {
        &self.shared.store
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> StageState {
        *self.state.lock()
    }

    /// Handle for interrupting [`Stage::start`]
    #[must_use]
    pub fn interrupter(&self) -> StageInterrupter {
        StageInterrupter {
            sender: self.sender.clone(),
        }
    }

    /// Run the stage from `initial` until nothing is outstanding
    ///
    /// Blocks the caller. Failed computations are reported through the
    /// message sink and listed in the report; they do not fail the stage.
    ///
    /// # Errors
    /// - [`StageError::AlreadyStarted`] on a second call
    /// - [`StageError::DuplicateSpec`] when two computations share a name
    /// - [`StageError::Store`] when a cache entry cannot be trusted
    ///
    /// After a fatal error no further computations are scheduled; those
    /// already running are waited for.
    pub fn start(&self, initial: Specification) -> Result<StageReport, StageError> {
        {
            let mut state = self.state.lock();
            if *state != StageState::NotStarted {
                return Err(StageError::AlreadyStarted {
                    stage: self.name().to_string(),
                });
            }
            *state = StageState::Running;
        }

        let span = tracing::info_span!("stage", stage = self.name());
        let _guard = span.enter();
        let _stage_run = self.profiler.wrap_stage_run();
        tracing::info!(initial = initial.name(), "stage started");

        let mut run = Run::default();
        self.schedule(&mut run, initial);

        while run.outstanding > 0 {
            match self.receiver.recv() {
                Ok(Event::Completed { name, result }) => {
                    run.outstanding -= 1;
                    run.completed += 1;
                    self.on_completed(&mut run, name, result);
                    self.shared.sink.progress(
                        fraction(run.completed, run.scheduled.len()),
                        &format!(
                            "{}: {}/{} computations",
                            self.name(),
                            run.completed,
                            run.scheduled.len()
                        ),
                    );
                }
                Ok(Event::Interrupt) => {
                    tracing::warn!(outstanding = run.outstanding, "stage interrupted");
                    run.report.interrupted = true;
                    break;
                }
                Err(_) => break,
            }
        }

        *self.state.lock() = StageState::Finished;

        let mut report = run.report;
        report.executed.sort();
        report.replayed.sort();
        report.failed.sort();
        tracing::info!(
            executed = report.executed.len(),
            replayed = report.replayed.len(),
            failed = report.failed.len(),
            "stage finished"
        );

        match run.abort {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn schedule(&self, run: &mut Run, spec: Specification) {
        if run.abort.is_some() {
            return;
        }

        if !run.scheduled.insert(spec.name().to_string()) {
            let message = format!(
                "Spec '{}' already scheduled in the same stage. Duplicate specs with same names in the same stage are not allowed.",
                spec.name()
            );
            let location = (!spec.location().is_empty()).then(|| spec.location());
            self.shared.sink.message(MessageLevel::Fatal, &message, location);
            run.abort = Some(StageError::DuplicateSpec {
                stage: self.name().to_string(),
                name: spec.name().to_string(),
            });
            return;
        }

        tracing::debug!(spec = spec.name(), unit = spec.unit(), "scheduled");
        run.outstanding += 1;
        let profiler = self.profiler.unit(spec.name());
        profiler.on_schedule(&spec);

        let shared = Arc::clone(&self.shared);
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let name = spec.name().to_string();
            let result = panic::catch_unwind(AssertUnwindSafe(|| shared.run(&spec, &profiler)))
                .unwrap_or_else(|payload| {
                    let message = format!("computation panicked: {}", panic_message(payload.as_ref()));
                    shared.fatal(&spec, &message);
                    Ok(Completion::failure(false))
                });
            let _ = sender.send(Event::Completed { name, result });
        });
    }

    fn on_completed(&self, run: &mut Run, name: String, result: Result<Completion, StageError>) {
        match result {
            Ok(completion) => {
                if completion.failed {
                    run.report.failed.push(name.clone());
                }
                if completion.replayed {
                    run.report.replayed.push(name);
                } else {
                    run.report.executed.push(name);
                }
                for nested in completion.nested {
                    self.schedule(run, nested);
                }
            }
            Err(err) => {
                self.shared
                    .sink
                    .message(MessageLevel::Fatal, &err.to_string(), Some(&name));
                run.report.failed.push(name);
                if run.abort.is_none() {
                    run.abort = Some(err);
                }
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

fn absolute(path: &Path) -> Result<PathBuf, StageError> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(|source| StageError::StageDir {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize(&cwd.join(path)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_empty_stage() {
        assert!((fraction(0, 0) - 1.0).abs() < f64::EPSILON);
        assert!((fraction(1, 4) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
