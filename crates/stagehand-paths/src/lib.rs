//! Stagehand Paths - path primitives and collision detection
//!
//! Provides:
//! - [`SegmentPath`]: absolute paths as segment lists
//! - [`normalize`] / [`relativize`]: lexical path arithmetic
//! - [`CollisionDetector`]: conflicting-operation detection across owners
//!
//! # Example
//!
//! ```rust
//! use stagehand_paths::CollisionDetector;
//! use std::path::Path;
//!
//! let mut detector = CollisionDetector::new();
//! detector.on_file_write(Path::new("/out/a.txt"), "producer").unwrap();
//! assert!(detector.on_file_read(Path::new("/out/a.txt"), "consumer").is_err());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod detector;
pub mod lexical;
pub mod segment;

pub use detector::{CollisionDetector, DetectorError, Operation, OperationType};
pub use lexical::{normalize, relativize, RelativizeError};
pub use segment::{PathError, SegmentPath};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
