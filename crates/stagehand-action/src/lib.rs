//! Stagehand Action - the action model and its cache
//!
//! Provides:
//! - [`Specification`]: immutable description of a computation
//! - [`Sketch`] / [`Action`]: side effects as reported and as persisted
//! - Fingerprints deciding whether a persisted action is still valid
//! - [`ActionStore`]: one YAML entry per specification name
//!
//! # Example
//!
//! ```rust,ignore
//! use stagehand_action::{ActionStore, FileMode, Sketch, Specification};
//!
//! let store = ActionStore::new("/build/stage1", "/build/.stagehand/actions/stage1");
//! let spec = Specification::builder("command").name("hello").build()?;
//! store.write(&spec, &[Sketch::file("x.txt", FileMode::Read)])?;
//! assert!(store.load(&spec)?.is_some());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod action;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod level;
pub mod mapping;
pub mod spec;
pub mod store;

pub use action::{Action, DirectoryMode, FileMode, Sketch};
pub use document::{read_sketches, write_sketches};
pub use error::{ActionError, DocumentError, StoreError};
pub use level::MessageLevel;
pub use mapping::PathMapping;
pub use spec::{compute_opaque_id, validate_name, SpecBuilder, SpecError, Specification};
pub use store::{ActionStore, CacheEntry, LoadedEntry, ENTRY_SUFFIX, STORE_VERSION};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with actions
    pub use crate::{
        Action, ActionStore, DirectoryMode, FileMode, MessageLevel, Sketch, Specification,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
