//! Creates the build instance and waits for it to come up.

use std::sync::Arc;

use thiserror::Error;

use crate::error::BuildError;
use crate::password::generate_password;
use crate::poll::{PollWaiter, Readiness};
use crate::provider::{CreateInstanceRequest, Instance, Provider};
use crate::runner::{Step, StepAction, StepContext, StepFuture};
use crate::state::BuildState;

use super::{fail, timestamp};

/// Instance parameters taken from the build configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceSettings {
    /// Datacenter location slug.
    pub location_slug: String,
    /// Plan slug.
    pub plan_slug: String,
    /// Image slug.
    pub image_slug: String,
    /// Hostname override.
    pub hostname: Option<String>,
    /// Label prefix.
    pub label: Option<String>,
    /// Length of the generated root password.
    pub password_length: usize,
    /// Whether to skip deleting the instance during cleanup.
    pub keep_instance: bool,
}

#[derive(Debug, Error)]
#[error("instance {identifier} has no IP address")]
struct MissingAddress {
    identifier: String,
}

/// Creates an instance and waits until it is built, unlocked, and running.
pub struct CreateInstanceStep<P: Provider> {
    provider: Arc<P>,
    settings: InstanceSettings,
    waiter: PollWaiter,
}

impl<P: Provider> CreateInstanceStep<P> {
    /// Creates the step; `waiter` bounds the readiness wait.
    #[must_use]
    pub const fn new(provider: Arc<P>, settings: InstanceSettings, waiter: PollWaiter) -> Self {
        Self {
            provider,
            settings,
            waiter,
        }
    }

    fn names(&self) -> (String, String) {
        let stamp = timestamp();
        let label = self.settings.label.as_deref().map_or_else(
            || format!("letsbake-{stamp}"),
            |prefix| format!("{prefix}-{stamp}"),
        );
        let hostname = self
            .settings
            .hostname
            .clone()
            .unwrap_or_else(|| format!("letsbake-{stamp}"));
        (label, hostname)
    }

    async fn create(&self, state: &mut BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        let ssh_slug = state.require_ssh_key_slug()?.to_owned();
        let password = generate_password(self.settings.password_length)?;
        let (label, hostname) = self.names();

        ctx.ui().say("Creating instance...");
        let request = CreateInstanceRequest {
            location_slug: self.settings.location_slug.clone(),
            plan_slug: self.settings.plan_slug.clone(),
            hostname: hostname.clone(),
            label: label.clone(),
            image_slug: self.settings.image_slug.clone(),
            ssh_slug,
            password: password.clone(),
        };
        self.provider
            .create_instance(&request)
            .await
            .map_err(|err| BuildError::provider("create instance", err))?;
        state.generated_password = Some(password);
        tracing::info!(%label, %hostname, "instance creation requested");

        ctx.ui()
            .say(&format!("Waiting for instance {label} to become ready..."));
        let provider = self.provider.as_ref();
        let (label_ref, hostname_ref) = (label.as_str(), hostname.as_str());
        let waited = self
            .waiter
            .wait(&format!("instance {label}"), ctx.cancel(), || async move {
                let instances = provider.list_instances().await?;
                Ok::<_, P::Error>(ready_instance(instances, label_ref, hostname_ref))
            })
            .await;
        let instance = match waited {
            Ok(instance) => instance,
            Err(err) => {
                state.instance_identifier = self.find_created(&label, &hostname).await;
                return Err(BuildError::from_wait("list instances", err));
            }
        };

        let identifier = instance.identifier.clone();
        state.instance_identifier = Some(identifier.clone());
        let ip = instance.primary_ip().ok_or_else(|| {
            BuildError::provider(
                "read instance address",
                MissingAddress {
                    identifier: identifier.clone(),
                },
            )
        })?;
        state.instance_ip = Some(ip.to_owned());
        ctx.ui()
            .say(&format!("Instance {identifier} is ready at {ip}"));
        Ok(())
    }

    /// Looks up the created instance in whatever state it is in, so cleanup
    /// can destroy it after an abandoned wait. Lookup failures are logged.
    async fn find_created(&self, label: &str, hostname: &str) -> Option<String> {
        let instances = match self.provider.list_instances().await {
            Ok(instances) => instances,
            Err(err) => {
                tracing::warn!(%label, error = %err, "could not look up the created instance");
                return None;
            }
        };
        let Some(found) = instances
            .into_iter()
            .find(|instance| instance.label == label && instance.hostname == hostname)
        else {
            tracing::warn!(%label, "created instance is not listed");
            return None;
        };
        tracing::info!(%label, identifier = %found.identifier, "recorded unfinished instance for cleanup");
        Some(found.identifier)
    }
}

/// Picks the instance matching `label` and `hostname` once it is usable.
///
/// A matching instance that is still building, locked, or suspended keeps
/// the wait going.
fn ready_instance(instances: Vec<Instance>, label: &str, hostname: &str) -> Readiness<Instance> {
    instances
        .into_iter()
        .find(|instance| {
            instance.label == label && instance.hostname == hostname && instance.is_ready()
        })
        .map_or(Readiness::Pending, Readiness::Ready)
}

impl<P: Provider> Step for CreateInstanceStep<P> {
    fn name(&self) -> &'static str {
        "create_instance"
    }

    fn run<'a>(
        &'a mut self,
        state: &'a mut BuildState,
        ctx: &'a StepContext,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match self.create(state, ctx).await {
                Ok(()) => StepAction::Continue,
                Err(err) => fail(state, ctx, err),
            }
        })
    }

    fn cleanup<'a>(&'a mut self, state: &'a BuildState, ctx: &'a StepContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            let Some(identifier) = state.instance_identifier.as_deref() else {
                return;
            };
            if self.settings.keep_instance {
                ctx.ui()
                    .say(&format!("Keeping instance {identifier} as requested"));
                return;
            }
            ctx.ui().say(&format!("Destroying instance {identifier}..."));
            if let Err(err) = self.provider.delete_instance(identifier).await {
                tracing::warn!(%identifier, error = %err, "failed to delete instance");
                ctx.ui().error(&format!(
                    "Error destroying instance {identifier}: {err}. Please destroy it manually."
                ));
            }
        })
    }
}
