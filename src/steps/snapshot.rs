//! Captures the powered-off instance as a snapshot.

use std::convert::Infallible;
use std::sync::Arc;

use crate::error::BuildError;
use crate::poll::{PollWaiter, Readiness};
use crate::provider::Provider;
use crate::runner::{Step, StepAction, StepContext, StepFuture};
use crate::state::BuildState;

use super::shutdown::raise_request_timeout;
use super::{fail, timestamp};

/// Requests a snapshot and waits for it to finish building.
///
/// Lookup failures while waiting are reported and retried until the
/// timeout, unlike instance listing failures which end the build.
pub struct SnapshotStep<P: Provider> {
    provider: Arc<P>,
    snapshot_name: Option<String>,
    waiter: PollWaiter,
}

impl<P: Provider> SnapshotStep<P> {
    /// Creates the step. `snapshot_name` overrides the generated label.
    #[must_use]
    pub const fn new(provider: Arc<P>, snapshot_name: Option<String>, waiter: PollWaiter) -> Self {
        Self {
            provider,
            snapshot_name,
            waiter,
        }
    }

    async fn capture(
        &self,
        state: &mut BuildState,
        ctx: &StepContext,
        identifier: &str,
    ) -> Result<(), BuildError> {
        let label = self
            .snapshot_name
            .clone()
            .unwrap_or_else(|| format!("letsbake-snapshot-{}", timestamp()));

        raise_request_timeout(self.provider.as_ref(), ctx.ui());
        ctx.ui().say(&format!("Creating snapshot {label}..."));
        let handle = self
            .provider
            .create_snapshot(&label, identifier)
            .await
            .map_err(|err| BuildError::provider("create snapshot", err))?;
        let slug = handle.slug;
        ctx.ui().say(&format!(
            "Snapshot '{slug}' creation has been queued. Waiting for it to finish..."
        ));

        let provider = self.provider.as_ref();
        let ui = ctx.ui();
        let slug_ref = slug.as_str();
        self.waiter
            .wait(&format!("snapshot {slug}"), ctx.cancel(), || async move {
                let readiness = match provider.get_snapshot(slug_ref).await {
                    Ok(snapshot) if snapshot.build => Readiness::Ready(()),
                    Ok(_) => Readiness::Pending,
                    Err(err) => {
                        tracing::warn!(slug = slug_ref, error = %err, "snapshot lookup failed");
                        ui.error(&format!("Error checking snapshot {slug_ref}: {err}"));
                        Readiness::Pending
                    }
                };
                Ok::<_, Infallible>(readiness)
            })
            .await
            .map_err(|err| BuildError::from_wait("query snapshot", err))?;

        ctx.ui().say(&format!("Snapshot {label} is ready"));
        state.snapshot_slug = Some(slug);
        state.snapshot_name = Some(label);
        Ok(())
    }
}

impl<P: Provider> Step for SnapshotStep<P> {
    fn name(&self) -> &'static str {
        "snapshot"
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
            match self.capture(state, ctx, &identifier).await {
                Ok(()) => StepAction::Continue,
                Err(err) => fail(state, ctx, err),
            }
        })
    }
}
