//! Stagehand Units - built-in computation types
//!
//! - [`BootstrapUnit`]: reads a stage file and schedules its units
//! - [`CommandUnit`]: runs an external executable that reports sketches

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod command;

pub use bootstrap::{bootstrap_spec, BootstrapUnit, BOOTSTRAP, DEFAULT_STAGE_FILE};
pub use command::{
    CommandUnit, ACTIONS_OUTPUT_ENV, COMMAND, PARAMS_COUNT_ENV, PARAM_VALUE_ENV_PREFIX,
};

use stagehand_action::Specification;
use stagehand_stage::{Unit, UnitError, UnitRegistry};

/// Register the built-in unit types
pub fn register_builtins(registry: &mut UnitRegistry) {
    registry.register(BOOTSTRAP, |_: &Specification| -> Result<Box<dyn Unit>, UnitError> {
        Ok(Box::new(BootstrapUnit))
    });
    registry.register(COMMAND, |_: &Specification| -> Result<Box<dyn Unit>, UnitError> {
        Ok(Box::new(CommandUnit))
    });
}

/// Registry containing only the built-in unit types
#[must_use]
pub fn builtin_registry() -> UnitRegistry {
    let mut registry = UnitRegistry::new();
    register_builtins(&mut registry);
    registry
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
