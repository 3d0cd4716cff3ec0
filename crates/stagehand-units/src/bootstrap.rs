//! Stage bootstrap unit
//!
//! Every stage starts from the bootstrap specification. The unit reads the
//! stage file (`stage.yml` by default) and requests one computation per
//! declared unit:
//!
//! ```yaml
//! units:
//!   - type: command
//!     name: hello
//!     command: ./hello.sh --loud
//!     params: [world]
//! ```

use crate::command::COMMAND;
use serde::Deserialize;
use stagehand_action::{SpecError, Specification};
use stagehand_stage::{ActionRecorder, Unit, UnitContext, UnitError};
use std::fs;
use std::io::ErrorKind;

/// Unit type and specification name of the bootstrap computation
pub const BOOTSTRAP: &str = "bootstrap";

/// Stage file read when the bootstrap specification names none
pub const DEFAULT_STAGE_FILE: &str = "stage.yml";

const SUPPORTED_TYPES: &[&str] = &[COMMAND];

/// Bootstrap specification reading `stage_file`
///
/// # Errors
/// Never fails in practice; the name is a constant valid name
pub fn bootstrap_spec(stage_file: &str) -> Result<Specification, SpecError> {
    Specification::builder(BOOTSTRAP)
        .name(BOOTSTRAP)
        .params([stage_file])
        .location(stage_file)
        .build()
}

#[derive(Debug, Deserialize)]
struct StageFile {
    #[serde(default)]
    units: Vec<UnitDescriptor>,
}

#[derive(Debug, Deserialize)]
struct UnitDescriptor {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    command: CommandLine,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    params: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Line(String),
    Words(Vec<String>),
}

impl CommandLine {
    fn into_words(self) -> Vec<String> {
        match self {
            Self::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            Self::Words(words) => words,
        }
    }
}

impl UnitDescriptor {
    fn into_spec(self, location: String) -> Result<Specification, String> {
        let command = self.command.into_words();
        if command.is_empty() {
            return Err("empty command".to_string());
        }

        let mut builder = Specification::builder(self.kind)
            .command(command)
            .params(self.params)
            .location(location);
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(revision) = self.revision {
            builder = builder.revision(revision);
        }
        builder.build().map_err(|err| err.to_string())
    }
}

fn parse_stage_file(text: &str) -> Result<StageFile, String> {
    if text.trim().is_empty() {
        return Err("empty document".to_string());
    }
    serde_yaml::from_str(text).map_err(|err| err.to_string())
}

/// Reads the stage file and schedules the declared units
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapUnit;

impl Unit for BootstrapUnit {
    fn execute(&mut self, ctx: &UnitContext, recorder: &mut ActionRecorder<'_>) -> Result<(), UnitError> {
        let file = ctx
            .spec()
            .params()
            .first()
            .map_or(DEFAULT_STAGE_FILE, String::as_str);
        let path = ctx.stage_dir().join(file);

        recorder.check_file_exists(file);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                recorder.warn(format!("not found: {}", path.display()));
                return Ok(());
            }
            Err(err) => {
                return Err(UnitError::io_error(
                    format!("cannot inspect {}", path.display()),
                    err,
                ))
            }
        };
        if !metadata.is_file() {
            recorder.error(format!("not a file: {}", path.display()));
            return Ok(());
        }

        recorder.read_file(file);
        let text = fs::read_to_string(&path)
            .map_err(|err| UnitError::io_error(format!("cannot read {}", path.display()), err))?;

        let stage_file = match parse_stage_file(&text) {
            Ok(stage_file) => stage_file,
            Err(cause) => {
                recorder.error(format!("malformed: {}. cause: {cause}", path.display()));
                return Ok(());
            }
        };

        tracing::debug!(stage = ctx.stage_name(), units = stage_file.units.len(), "stage file parsed");
        for (index, descriptor) in stage_file.units.into_iter().enumerate() {
            let location = format!("{file}#units[{index}]");
            if !SUPPORTED_TYPES.contains(&descriptor.kind.as_str()) {
                recorder.error(format!(
                    "unsupported unit type '{}' at {location}",
                    descriptor.kind
                ));
                continue;
            }
            match descriptor.into_spec(location.clone()) {
                Ok(spec) => {
                    recorder.info(format!("Scheduled unit: {}", spec.name()));
                    recorder.exec(spec);
                }
                Err(cause) => recorder.error(format!("invalid unit at {location}: {cause}")),
            }
        }
        Ok(())
    }
}
