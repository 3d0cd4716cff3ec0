//! External command unit
//!
//! Runs `command[0]` with the remaining words as arguments inside the stage
//! directory. The process reports its side effects by writing a sketch
//! document stream to the file named by [`ACTIONS_OUTPUT_ENV`]; its stdout
//! and stderr lines become INFO and ERROR messages.

use crossbeam::channel::{self, Sender};
use stagehand_action::{read_sketches, MessageLevel};
use stagehand_stage::{ActionRecorder, Unit, UnitContext, UnitError};
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

/// Unit type of external commands
pub const COMMAND: &str = "command";

/// File the process writes its sketch stream to
pub const ACTIONS_OUTPUT_ENV: &str = "STAGEHAND_ACTIONS_OUTPUT_FILE";

/// Number of specification parameters
pub const PARAMS_COUNT_ENV: &str = "STAGEHAND_PARAMS_COUNT";

/// Prefix of `STAGEHAND_PARAM_VALUE_<index>`
pub const PARAM_VALUE_ENV_PREFIX: &str = "STAGEHAND_PARAM_VALUE_";

/// Exit code recorded when the process was terminated by a signal
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// Runs an external executable
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandUnit;

impl Unit for CommandUnit {
    fn execute(&mut self, ctx: &UnitContext, recorder: &mut ActionRecorder<'_>) -> Result<(), UnitError> {
        let spec = ctx.spec();
        let Some((program, args)) = spec.command().split_first() else {
            return Err(UnitError::Failed(format!("spec '{}' has an empty command", spec.name())));
        };

        // Bare names are looked up on PATH and are not tracked as inputs.
        let executable = if Path::new(program).components().count() > 1 {
            recorder.read_file(program);
            ctx.stage_dir().join(program)
        } else {
            PathBuf::from(program)
        };

        let actions = tempfile::Builder::new()
            .prefix("stagehand-actions-")
            .suffix(".yml")
            .tempfile()
            .map_err(|err| UnitError::io_error("cannot create actions file", err))?;

        let mut command = Command::new(&executable);
        command
            .args(args)
            .current_dir(ctx.stage_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env(ACTIONS_OUTPUT_ENV, actions.path())
            .env(PARAMS_COUNT_ENV, spec.params().len().to_string());
        for (index, value) in spec.params().iter().enumerate() {
            command.env(format!("{PARAM_VALUE_ENV_PREFIX}{index}"), value);
        }

        tracing::debug!(program = %executable.display(), ?args, "spawning");
        let mut child = command.spawn().map_err(|source| UnitError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (sender, receiver) = channel::unbounded();
        thread::scope(|scope| {
            if let Some(stdout) = stdout {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stdout, MessageLevel::Info, &sender));
            }
            if let Some(stderr) = stderr {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stderr, MessageLevel::Error, &sender));
            }
            drop(sender);
            for (level, line) in receiver {
                recorder.message(level, line);
            }
        });

        let status = child
            .wait()
            .map_err(|err| UnitError::io_error(format!("cannot wait for '{program}'"), err))?;
        let exit_code = status.code().unwrap_or(SIGNALLED_EXIT_CODE);
        tracing::debug!(exit_code, "process finished");

        let text = fs::read_to_string(actions.path())
            .map_err(|err| UnitError::io_error("cannot read actions file", err))?;
        for sketch in read_sketches(&text)? {
            recorder.record(sketch);
        }
        recorder.exit(exit_code);
        Ok(())
    }
}

fn forward_lines<R: Read>(stream: R, level: MessageLevel, sender: &Sender<(MessageLevel, String)>) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer)
                    .trim_end_matches(|c: char| c == '\n' || c == '\r')
                    .to_string();
                if sender.send((level, line)).is_err() {
                    break;
                }
            }
        }
    }
}
