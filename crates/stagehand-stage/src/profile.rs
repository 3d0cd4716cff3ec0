//! Build profiling
//!
//! Profilers emit timestamped events for the phases of a build: the build
//! itself, each stage run and, per computation, its scheduling, cache load,
//! unit run, cache write and messages. Timed phases produce a `<phase>:start`
//! and a `<phase>:end` event; the end event carries the elapsed time.
//!
//! Every event is logged as a `tracing` trace event under the
//! `stagehand::profile` target and, when a [`ProfileLog`] is attached,
//! appended to it.

use parking_lot::Mutex;
use serde::Serialize;
use stagehand_action::{MessageLevel, Specification};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// One profiling event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEvent {
    /// Nanoseconds since the profiler was created
    pub clock: u64,
    /// Event name, such as `run:start`
    pub name: String,
    /// Stage the event belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Computation the event belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Event-specific data
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

/// Append-only collection of profiling events
#[derive(Debug, Default)]
pub struct ProfileLog {
    inner: Mutex<Vec<ProfileEvent>>,
}

impl ProfileLog {
    /// Create empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event
    pub fn append(&self, event: ProfileEvent) {
        self.inner.lock().push(event);
    }

    /// Every event so far, in emission order
    #[must_use]
    pub fn events(&self) -> Vec<ProfileEvent> {
        self.inner.lock().clone()
    }

    /// Events of one computation, in emission order
    #[must_use]
    pub fn for_unit(&self, stage: &str, unit: &str) -> Vec<ProfileEvent> {
        self.inner
            .lock()
            .iter()
            .filter(|event| event.stage.as_deref() == Some(stage) && event.unit.as_deref() == Some(unit))
            .cloned()
            .collect()
    }

    /// Number of events
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no event was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Build-wide profiler
///
/// Cheap to clone; every clone shares the clock origin and the log.
#[derive(Debug, Clone)]
pub struct Profiler {
    origin: Instant,
    log: Option<Arc<ProfileLog>>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            log: None,
        }
    }
}

impl Profiler {
    /// Create profiler whose clock starts now, logging through `tracing` only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append events to `log`
    #[must_use]
    pub fn with_log(mut self, log: Arc<ProfileLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Time the whole build
    pub fn wrap_build(&self) -> PhaseGuard {
        self.emitter(None, None).wrap("build")
    }

    /// Profiler for stage `name`
    #[must_use]
    pub fn stage(&self, name: &str) -> StageProfiler {
        StageProfiler {
            emitter: self.emitter(Some(name), None),
        }
    }

    fn emitter(&self, stage: Option<&str>, unit: Option<&str>) -> Emitter {
        Emitter {
            profiler: self.clone(),
            stage: stage.map(str::to_string),
            unit: unit.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
struct Emitter {
    profiler: Profiler,
    stage: Option<String>,
    unit: Option<String>,
}

impl Emitter {
    fn emit(&self, name: &str, data: BTreeMap<String, String>) {
        let clock = u64::try_from(self.profiler.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        tracing::trace!(
            target: "stagehand::profile",
            clock,
            stage = self.stage.as_deref(),
            unit = self.unit.as_deref(),
            ?data,
            "{name}"
        );
        if let Some(log) = &self.profiler.log {
            log.append(ProfileEvent {
                clock,
                name: name.to_string(),
                stage: self.stage.clone(),
                unit: self.unit.clone(),
                data,
            });
        }
    }

    fn wrap(&self, phase: &'static str) -> PhaseGuard {
        self.emit(&format!("{phase}:start"), BTreeMap::new());
        PhaseGuard {
            emitter: self.clone(),
            phase,
            started: Instant::now(),
        }
    }
}

/// Open timed phase; emits `<phase>:end` when dropped
#[must_use = "the phase ends when the guard is dropped"]
#[derive(Debug)]
pub struct PhaseGuard {
    emitter: Emitter,
    phase: &'static str,
    started: Instant,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        let mut data = BTreeMap::new();
        data.insert(
            "elapsedUs".to_string(),
            self.started.elapsed().as_micros().to_string(),
        );
        self.emitter.emit(&format!("{}:end", self.phase), data);
    }
}

/// Profiler of one stage
#[derive(Debug, Clone)]
pub struct StageProfiler {
    emitter: Emitter,
}

impl StageProfiler {
    /// Time one run of the stage
    pub fn wrap_stage_run(&self) -> PhaseGuard {
        self.emitter.wrap("stage")
    }

    /// Profiler for the computation `name`
    #[must_use]
    pub fn unit(&self, name: &str) -> UnitProfiler {
        UnitProfiler {
            emitter: Emitter {
                unit: Some(name.to_string()),
                ..self.emitter.clone()
            },
        }
    }
}

/// Profiler of one computation, handed to its unit through the unit context
#[derive(Debug, Clone, Default)]
pub struct UnitProfiler {
    emitter: Emitter,
}

impl Default for Emitter {
    fn default() -> Self {
        Profiler::default().emitter(None, None)
    }
}

impl UnitProfiler {
    /// The computation was scheduled
    pub fn on_schedule(&self, spec: &Specification) {
        let mut data = BTreeMap::new();
        data.insert("unitType".to_string(), spec.unit().to_string());
        data.insert("opaqueId".to_string(), spec.opaque_id().to_string());
        self.emitter.emit("schedule", data);
    }

    /// Time the whole execution, cached or fresh
    pub fn wrap_execution(&self) -> PhaseGuard {
        self.emitter.wrap("execution")
    }

    /// Time loading and validating the cache entry
    pub fn wrap_load(&self) -> PhaseGuard {
        self.emitter.wrap("load")
    }

    /// Time running the unit
    pub fn wrap_run(&self) -> PhaseGuard {
        self.emitter.wrap("run")
    }

    /// Time persisting the cache entry
    pub fn wrap_write(&self) -> PhaseGuard {
        self.emitter.wrap("write")
    }

    /// The computation reported a message
    pub fn on_message(&self, level: MessageLevel, message: &str) {
        let mut data = BTreeMap::new();
        data.insert("level".to_string(), level.to_string());
        data.insert("message".to_string(), message.to_string());
        self.emitter.emit("message", data);
    }

    /// Emit a custom event from inside a unit
    pub fn event(&self, name: &str, data: BTreeMap<String, String>) {
        self.emitter.emit(name, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(events: &[ProfileEvent]) -> Vec<&str> {
        events.iter().map(|event| event.name.as_str()).collect()
    }

    #[test]
    fn phases_emit_start_and_end() {
        let log = Arc::new(ProfileLog::new());
        let profiler = Profiler::new().with_log(log.clone());
        let unit = profiler.stage("s1").unit("compile");
        {
            let _run = unit.wrap_run();
            unit.on_message(MessageLevel::Warn, "careful");
        }

        let events = log.for_unit("s1", "compile");
        assert_eq!(names(&events), vec!["run:start", "message", "run:end"]);
        assert!(events[2].data.contains_key("elapsedUs"));
        assert_eq!(events[1].data["level"], "WARN");
        assert!(events.windows(2).all(|pair| pair[0].clock <= pair[1].clock));
    }

    #[test]
    fn build_and_stage_events_carry_no_unit() {
        let log = Arc::new(ProfileLog::new());
        let profiler = Profiler::new().with_log(log.clone());
        drop(profiler.wrap_build());
        drop(profiler.stage("s1").wrap_stage_run());

        let events = log.events();
        assert_eq!(names(&events), vec!["build:start", "build:end", "stage:start", "stage:end"]);
        assert_eq!(events[0].stage, None);
        assert_eq!(events[2].stage.as_deref(), Some("s1"));
        assert!(events.iter().all(|event| event.unit.is_none()));
    }

    #[test]
    fn profiler_without_log_only_traces() {
        let unit = UnitProfiler::default();
        unit.on_message(MessageLevel::Info, "hello");
        drop(unit.wrap_execution());
    }
}
