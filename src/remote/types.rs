//! Captured SSH client output and the seam used to spawn the client.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;

use super::RemoteError;

/// What the SSH client reported for one remote command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit status; `None` when the client was killed by a signal. The SSH
    /// client itself exits with 255 when it cannot reach the host.
    pub code: Option<i32>,
    /// Standard output, decoded lossily.
    pub stdout: String,
    /// Standard error, decoded lossily.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` for a zero exit status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Exit status as text, `unknown` when there was none.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Boxed future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, RemoteError>> + Send + 'a>>;

/// Spawns a program and waits for it; replaced by a scripted fake in tests.
///
/// Dropping the returned future abandons the command, so callers can race it
/// against a deadline or cancellation.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the program cannot be started.
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a>;
}

/// [`CommandRunner`] backed by [`tokio::process::Command`].
///
/// Standard input is closed so an unexpected prompt fails instead of
/// blocking the build. The child is killed if the future is dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        Box::pin(async move {
            let finished = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| RemoteError::Spawn {
                    program: program.to_owned(),
                    message: err.to_string(),
                })?;

            let output = CommandOutput {
                code: finished.status.code(),
                stdout: String::from_utf8_lossy(&finished.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&finished.stderr).into_owned(),
            };
            tracing::debug!(program, code = ?output.code, "command finished");
            Ok(output)
        })
    }
}
