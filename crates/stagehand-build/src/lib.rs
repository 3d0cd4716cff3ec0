//! Stagehand Build - runs every stage of a build directory
//!
//! - [`BuildConfig`]: directories, parallelism and stage file
//! - [`Build`]: sequential stage driver sharing one worker pool
//! - [`ReportingSink`]: error and warning accounting across stages
//!
//! # Example
//!
//! ```rust,ignore
//! use stagehand_build::{Build, BuildConfig};
//!
//! let summary = Build::new(BuildConfig::new().with_build_dir("build")).run()?;
//! println!("{}", summary.render_text());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod build;
pub mod config;
pub mod report;

pub use build::{list_stages, Build, BuildError, BuildSummary, StageSummary};
pub use config::{BuildConfig, ConfigError, STORE_SUBDIR};
pub use report::{ReportingSink, ScopedProgress};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
