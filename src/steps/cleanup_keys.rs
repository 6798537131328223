//! Removes the build's temporary key from the instance before capture.

use crate::error::BuildError;
use crate::remote::{CommandRunner, remove_authorized_key_command};
use crate::runner::{Step, StepAction, StepContext, StepFuture};
use crate::state::BuildState;

use super::{SharedShell, fail, run_remote};

/// Strips the generated public key from `~/.ssh/authorized_keys`.
///
/// Does nothing unless enabled, or when the key was supplied by the user.
pub struct CleanupTempKeysStep<R: CommandRunner> {
    shell: SharedShell<R>,
    enabled: bool,
}

impl<R: CommandRunner> CleanupTempKeysStep<R> {
    /// Creates the step.
    #[must_use]
    pub const fn new(shell: SharedShell<R>, enabled: bool) -> Self {
        Self { shell, enabled }
    }

    async fn clean(
        &self,
        state: &BuildState,
        ctx: &StepContext,
        public_key: &str,
    ) -> Result<(), BuildError> {
        ctx.ui()
            .say("Removing temporary SSH key from authorized_keys...");
        run_remote(
            &self.shell,
            state,
            ctx,
            &remove_authorized_key_command(public_key),
        )
        .await
    }
}

impl<R: CommandRunner> Step for CleanupTempKeysStep<R> {
    fn name(&self) -> &'static str {
        "cleanup_temp_keys"
    }

    fn run<'a>(
        &'a mut self,
        state: &'a mut BuildState,
        ctx: &'a StepContext,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            if !self.enabled {
                return StepAction::Continue;
            }
            let Some(public_key) = state.public_key.clone() else {
                ctx.ui()
                    .say("Skipping authorized_keys cleanup: the SSH key was not generated by this build");
                return StepAction::Continue;
            };
            match self.clean(state, ctx, &public_key).await {
                Ok(()) => StepAction::Continue,
                Err(err) => fail(state, ctx, err),
            }
        })
    }
}
