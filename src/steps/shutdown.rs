//! Powers the instance off before the image is captured.

use std::sync::Arc;
use std::time::Duration;

use crate::error::BuildError;
use crate::provider::Provider;
use crate::runner::{Step, StepAction, StepContext, StepFuture};
use crate::state::BuildState;
use crate::ui::Ui;

use super::fail;

/// Request timeout used for power-off and snapshot calls, which the API
/// answers slowly.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Raises the provider request timeout; failure is reported, not fatal.
pub(super) fn raise_request_timeout<P: Provider>(provider: &P, ui: &dyn Ui) {
    if let Err(err) = provider.set_request_timeout(REQUEST_TIMEOUT) {
        tracing::warn!(error = %err, "could not raise request timeout");
        ui.error(&format!("Error setting request timeout: {err}"));
    }
}

/// Powers off the instance recorded in the build state.
pub struct ShutdownStep<P: Provider> {
    provider: Arc<P>,
}

impl<P: Provider> ShutdownStep<P> {
    /// Creates the step.
    #[must_use]
    pub const fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl<P: Provider> Step for ShutdownStep<P> {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    fn run<'a>(
        &'a mut self,
        state: &'a mut BuildState,
        ctx: &'a StepContext,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            let Some(identifier) = state.instance_identifier.clone() else {
                return StepAction::Continue;
            };

            ctx.ui()
                .say(&format!("Shutting down instance {identifier}..."));
            raise_request_timeout(self.provider.as_ref(), ctx.ui());
            if let Err(err) = self.provider.power_off_instance(&identifier).await {
                return fail(state, ctx, BuildError::provider("power off instance", err));
            }
            ctx.ui()
                .say(&format!("Instance {identifier} is powered off"));
            StepAction::Continue
        })
    }
}
