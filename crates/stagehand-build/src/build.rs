//! Multi-stage build driver
//!
//! Every non-hidden subdirectory of the build directory is a stage. Stages
//! run one after another in name order, each starting from the bootstrap
//! specification and sharing a single worker pool.

use crate::config::{BuildConfig, ConfigError};
use crate::report::{ReportingSink, ScopedProgress};
use stagehand_action::SpecError;
use stagehand_stage::{
    MessageSink, PoolError, ProfileLog, Profiler, Stage, StageError, StageReport, UnitRegistry,
    WorkerPool,
};
use stagehand_units::{bootstrap_spec, builtin_registry};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors that abort a build
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The build directory does not exist or is a file
    #[error("build directory {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The build directory could not be listed
    #[error("cannot scan build directory {}: {source}", .path.display())]
    Io {
        /// Directory being scanned
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The worker pool could not be created
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The bootstrap specification is invalid
    #[error("invalid bootstrap specification: {0}")]
    Spec(#[from] SpecError),

    /// A stage failed fatally
    #[error("stage '{stage}' aborted: {source}")]
    Stage {
        /// Stage name
        stage: String,
        /// Stage failure
        #[source]
        source: StageError,
    },
}

/// Result of one finished stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    /// Stage name
    pub name: String,
    /// What the stage ran, replayed and failed
    pub report: StageReport,
}

/// Result of a whole build
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    /// Finished stages in execution order
    pub stages: Vec<StageSummary>,
    /// FATAL and ERROR messages reported
    pub errors: usize,
    /// WARN messages reported
    pub warnings: usize,
    /// Wall time of the build
    pub elapsed: Duration,
}

impl BuildSummary {
    /// No computation failed and no error was reported
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.errors == 0 && self.stages.iter().all(|stage| stage.report.failed.is_empty())
    }

    #[must_use]
    pub fn executed(&self) -> usize {
        self.stages.iter().map(|stage| stage.report.executed.len()).sum()
    }

    #[must_use]
    pub fn replayed(&self) -> usize {
        self.stages.iter().map(|stage| stage.report.replayed.len()).sum()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.stages.iter().map(|stage| stage.report.failed.len()).sum()
    }

    /// Human-readable summary
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for stage in &self.stages {
            let report = &stage.report;
            let _ = writeln!(
                out,
                "stage {}: {} executed, {} replayed, {} failed{}",
                stage.name,
                report.executed.len(),
                report.replayed.len(),
                report.failed.len(),
                if report.interrupted { " (interrupted)" } else { "" }
            );
            for name in &report.failed {
                let _ = writeln!(out, "  failed: {name}");
            }
        }
        let _ = write!(
            out,
            "{}: {} executed, {} replayed, {} failed, {} errors, {} warnings in {:.2}s",
            if self.succeeded() { "BUILD SUCCEEDED" } else { "BUILD FAILED" },
            self.executed(),
            self.replayed(),
            self.failed(),
            self.errors,
            self.warnings,
            self.elapsed.as_secs_f64()
        );
        out
    }
}

/// Runs every stage of a build directory
pub struct Build {
    config: BuildConfig,
    registry: Arc<UnitRegistry>,
    sink: Option<Arc<dyn MessageSink>>,
    profile_log: Option<Arc<ProfileLog>>,
}

impl std::fmt::Debug for Build {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Build")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Build {
    /// Build with the built-in unit types
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            registry: Arc::new(builtin_registry()),
            sink: None,
            profile_log: None,
        }
    }

    /// Replace the unit registry
    #[must_use]
    pub fn with_registry(mut self, registry: UnitRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Also forward messages and progress to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Collect profiling events into `log`
    #[must_use]
    pub fn with_profile_log(mut self, log: Arc<ProfileLog>) -> Self {
        self.profile_log = Some(log);
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run all stages
    ///
    /// Failed computations are reported in the summary; only conditions that
    /// make the build untrustworthy (unusable cache entries, duplicate
    /// names, unreadable directories) are returned as errors.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the build directory
    /// cannot be scanned or a stage aborts
    pub fn run(&self) -> Result<BuildSummary, BuildError> {
        let started = Instant::now();
        self.config.validate()?;

        let build_dir = &self.config.build_dir;
        let stages = list_stages(build_dir)?;
        let store_root = self.config.effective_store_dir();
        let bootstrap = bootstrap_spec(&self.config.stage_file)?;
        let pool = Arc::new(WorkerPool::new(self.config.effective_parallelism())?);
        let sink = Arc::new(ReportingSink::new(self.sink.clone()));
        let profiler = match &self.profile_log {
            Some(log) => Profiler::new().with_log(Arc::clone(log)),
            None => Profiler::new(),
        };
        let build_phase = profiler.wrap_build();

        tracing::info!(
            build_dir = %build_dir.display(),
            store_dir = %store_root.display(),
            stages = stages.len(),
            threads = pool.threads(),
            "build started"
        );

        let mut summaries = Vec::with_capacity(stages.len());
        for (index, name) in stages.iter().enumerate() {
            let progress: Arc<dyn MessageSink> =
                Arc::new(ScopedProgress::new(sink.clone(), index, stages.len()));
            let stage_error = |source| BuildError::Stage {
                stage: name.clone(),
                source,
            };

            let stage = Stage::new(
                name.as_str(),
                build_dir.join(name),
                store_root.join(name),
                self.registry.clone(),
                pool.clone(),
                progress,
            )
            .map_err(stage_error)?
            .with_profiler(&profiler);

            let report = stage.start(bootstrap.clone()).map_err(stage_error)?;
            summaries.push(StageSummary {
                name: name.clone(),
                report,
            });
        }

        drop(build_phase);
        let summary = BuildSummary {
            stages: summaries,
            errors: sink.errors(),
            warnings: sink.warnings(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            succeeded = summary.succeeded(),
            errors = summary.errors,
            warnings = summary.warnings,
            tasks = pool.stats().tasks_spawned,
            "build finished"
        );
        Ok(summary)
    }
}

/// Names of the stage directories below `build_dir`, sorted
///
/// # Errors
/// Returns error if `build_dir` is not a readable directory
pub fn list_stages(build_dir: &Path) -> Result<Vec<String>, BuildError> {
    let io_error = |source| BuildError::Io {
        path: build_dir.to_path_buf(),
        source,
    };

    let metadata = fs::metadata(build_dir).map_err(io_error)?;
    if !metadata.is_dir() {
        return Err(BuildError::NotADirectory(build_dir.to_path_buf()));
    }

    let mut stages = Vec::new();
    for entry in fs::read_dir(build_dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if !entry.file_type().map_err(io_error)?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if !name.starts_with('.') => stages.push(name),
            Ok(_) => {}
            Err(name) => tracing::warn!(?name, "skipping stage directory with non UTF-8 name"),
        }
    }
    stages.sort();
    Ok(stages)
}
