//! Waits until the instance accepts SSH logins.

use crate::error::BuildError;
use crate::poll::{PollWaiter, Readiness, WaitError};
use crate::remote::{CommandRunner, RemoteError};
use crate::runner::{Step, StepAction, StepContext, StepFuture};
use crate::state::BuildState;

use super::{SharedShell, fail, identity, remote_error};

/// Retries a no-op SSH command until it succeeds or the wait times out.
///
/// A non-zero exit (for example 255 while sshd is still starting) counts as
/// "not ready yet"; failing to spawn the SSH client is fatal.
pub struct ConnectStep<R: CommandRunner> {
    shell: SharedShell<R>,
    waiter: PollWaiter,
}

impl<R: CommandRunner> ConnectStep<R> {
    /// Creates the step.
    #[must_use]
    pub const fn new(shell: SharedShell<R>, waiter: PollWaiter) -> Self {
        Self { shell, waiter }
    }

    async fn connect(&self, state: &BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        let host = state.require_instance_ip()?;
        let key = identity(state);
        ctx.ui().say(&format!("Waiting for SSH on {host}..."));

        let shell = self.shell.as_ref();
        self.waiter
            .wait(&format!("SSH on {host}"), ctx.cancel(), || async move {
                let output = shell.run(host, key, "true").await?;
                let readiness = if output.is_success() {
                    Readiness::Ready(())
                } else {
                    tracing::debug!(host, code = ?output.code, "SSH not accepting logins yet");
                    Readiness::Pending
                };
                Ok::<_, RemoteError>(readiness)
            })
            .await
            .map_err(|err| match err {
                WaitError::Query(source) => remote_error(&source),
                WaitError::Timeout { resource, elapsed } => BuildError::Timeout { resource, elapsed },
                WaitError::Cancelled => BuildError::Cancelled,
            })?;

        ctx.ui().say(&format!("Connected to {host}"));
        Ok(())
    }
}

impl<R: CommandRunner> Step for ConnectStep<R> {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn run<'a>(
        &'a mut self,
        state: &'a mut BuildState,
        ctx: &'a StepContext,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match self.connect(state, ctx).await {
                Ok(()) => StepAction::Continue,
                Err(err) => fail(state, ctx, err),
            }
        })
    }
}
