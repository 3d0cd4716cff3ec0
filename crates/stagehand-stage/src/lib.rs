//! Stagehand Stage - incremental execution of one stage
//!
//! Provides:
//! - [`Unit`] / [`UnitRegistry`]: the contract computations implement
//! - [`IntakeProcessor`]: consumption of one execution's sketch stream
//! - [`Stage`]: scheduling, cache replay and nested discovery
//! - [`WorkerPool`]: threads shared by every stage of a build
//! - [`Profiler`]: timed phase events per stage and computation
//!
//! # Example
//!
//! ```rust,ignore
//! use stagehand_stage::{Stage, TracingSink, UnitRegistry, WorkerPool};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(WorkerPool::new(4)?);
//! let stage = Stage::new(
//!     "stage1",
//!     "/build/stage1",
//!     "/build/.stagehand/actions/stage1",
//!     Arc::new(UnitRegistry::new()),
//!     pool,
//!     Arc::new(TracingSink),
//! )?;
//! let report = stage.start(initial_spec)?;
//! println!("executed {}, replayed {}", report.executed.len(), report.replayed.len());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod error;
pub mod intake;
pub mod message;
pub mod pool;
pub mod profile;
pub mod stage;
pub mod unit;

pub use error::{PoolError, StageError, UnitError};
pub use intake::{IntakeOutcome, IntakeProcessor};
pub use message::{MessageSink, TracingSink};
pub use pool::{PoolStats, WorkerPool};
pub use profile::{PhaseGuard, ProfileEvent, ProfileLog, Profiler, StageProfiler, UnitProfiler};
pub use stage::{Stage, StageInterrupter, StageReport, StageState};
pub use unit::{ActionRecorder, Unit, UnitContext, UnitFactory, UnitRegistry};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for implementing units
    pub use crate::{ActionRecorder, Unit, UnitContext, UnitError, UnitRegistry};
    pub use stagehand_action::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
