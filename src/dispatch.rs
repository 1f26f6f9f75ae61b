//! Purpose: Hand control to the `improver.cli` dispatcher process.
//! Exports: `RunOutcome`, `handoff`, `dispatcher_argv`.
//! Role: Terminal step of the bootstrap; nothing runs after a successful handoff.
//! Invariants: Arguments are forwarded verbatim in order and content.
//! Invariants: The dispatcher sees exactly the composed environment, nothing else.

use std::ffi::OsString;
use std::io;
use std::process::Command;

use tracing::debug;

use crate::environment::ProcessEnv;
use crate::error::{Error, ErrorKind};

/// Resolved against the composed `PATH`, so `<root>/bin` wins.
pub const DISPATCHER_PROGRAM: &str = "python3";
pub const DISPATCHER_MODULE: &str = "improver.cli";

/// Exit-code carrier for the paths where the handoff is not a process
/// replacement.
#[derive(Copy, Clone, Debug)]
pub struct RunOutcome {
    pub exit_code: i32,
}

impl RunOutcome {
    pub fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

/// Dispatcher argument vector: module selection first, then the launcher's
/// own arguments unchanged.
pub fn dispatcher_argv(args: &[OsString]) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(args.len() + 2);
    argv.push(OsString::from("-m"));
    argv.push(OsString::from(DISPATCHER_MODULE));
    argv.extend(args.iter().cloned());
    argv
}

pub fn handoff(env: &ProcessEnv, args: &[OsString]) -> Result<RunOutcome, Error> {
    let mut command = Command::new(DISPATCHER_PROGRAM);
    command
        .args(dispatcher_argv(args))
        .env_clear()
        .envs(env.iter());
    debug!(
        program = DISPATCHER_PROGRAM,
        module = DISPATCHER_MODULE,
        forwarded = args.len(),
        "handing off to dispatcher"
    );
    exec(command)
}

#[cfg(unix)]
fn exec(mut command: Command) -> Result<RunOutcome, Error> {
    use std::os::unix::process::CommandExt;

    // Terminal replacement: exec only returns on failure.
    let err = command.exec();
    Err(exec_error(err))
}

#[cfg(not(unix))]
fn exec(mut command: Command) -> Result<RunOutcome, Error> {
    let status = command.status().map_err(exec_error)?;
    Ok(RunOutcome::with_code(status.code().unwrap_or(1)))
}

fn exec_error(err: io::Error) -> Error {
    let kind = if err.kind() == io::ErrorKind::NotFound {
        ErrorKind::NotFound
    } else {
        ErrorKind::Handoff
    };
    Error::new(kind)
        .with_message(format!(
            "failed to execute `{DISPATCHER_PROGRAM} -m {DISPATCHER_MODULE}`"
        ))
        .with_hint(
            "The dispatcher is looked up on the composed PATH; check that the \
             installation's bin directory provides it.",
        )
        .with_source(err)
}
