//! Assembles the step chain from configuration and runs it.
//!
//! The [`Builder`] validates the configuration, wires the provider and the
//! remote shell into the lifecycle steps, drives them through a
//! [`StepRunner`], and turns the final state into an [`Artifact`] or the
//! error that halted the chain.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;

use crate::artifact::Artifact;
use crate::cancel::CancelSignal;
use crate::config::{BuildConfig, ConfigError};
use crate::error::BuildError;
use crate::poll::PollWaiter;
use crate::provider::Provider;
use crate::remote::{CommandRunner, RemoteShell};
use crate::runner::{Step, StepContext, StepRunner};
use crate::state::BuildState;
use crate::steps::{
    CleanupTempKeysStep, ConnectStep, CreateInstanceStep, CreateSshKeyStep, InstanceSettings,
    ProvisionStep, Provisioners, SharedShell, ShutdownStep, SnapshotStep,
};
use crate::ui::Ui;

const INSTANCE_POLL_INTERVAL: Duration = Duration::from_secs(10);
const SSH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const SNAPSHOT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Runs one image build against a provider.
pub struct Builder<P, R>
where
    P: Provider + 'static,
    R: CommandRunner + 'static,
{
    config: BuildConfig,
    provider: Arc<P>,
    shell: SharedShell<R>,
    provisioners: Provisioners,
    instance_poll_interval: Duration,
    ssh_poll_interval: Duration,
    snapshot_poll_interval: Duration,
}

impl<P, R> Builder<P, R>
where
    P: Provider + 'static,
    R: CommandRunner + 'static,
{
    /// Creates a builder. Configuration is validated when the chain is
    /// planned, before any step runs.
    #[must_use]
    pub fn new(
        config: BuildConfig,
        provider: P,
        shell: RemoteShell<R>,
        provisioners: Provisioners,
    ) -> Self {
        Self {
            config,
            provider: Arc::new(provider),
            shell: Arc::new(shell),
            provisioners,
            instance_poll_interval: INSTANCE_POLL_INTERVAL,
            ssh_poll_interval: SSH_POLL_INTERVAL,
            snapshot_poll_interval: SNAPSHOT_POLL_INTERVAL,
        }
    }

    /// Overrides the instance readiness polling interval.
    ///
    /// This is primarily used by tests to keep waits short.
    #[must_use]
    pub const fn with_instance_poll_interval(mut self, interval: Duration) -> Self {
        self.instance_poll_interval = interval;
        self
    }

    /// Overrides the SSH readiness polling interval.
    ///
    /// This is primarily used by tests to keep waits short.
    #[must_use]
    pub const fn with_ssh_poll_interval(mut self, interval: Duration) -> Self {
        self.ssh_poll_interval = interval;
        self
    }

    /// Overrides the snapshot polling interval.
    ///
    /// This is primarily used by tests to keep waits short.
    #[must_use]
    pub const fn with_snapshot_poll_interval(mut self, interval: Duration) -> Self {
        self.snapshot_poll_interval = interval;
        self
    }

    /// Validates the configuration and builds the step chain.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every configuration problem,
    /// including an existing SSH key slug configured without a private key
    /// file to log in with.
    pub fn plan(&self) -> Result<StepRunner, ConfigError> {
        let mut problems = match self.config.validate() {
            Ok(()) => Vec::new(),
            Err(ConfigError::Invalid { problems }) => problems,
            Err(err) => return Err(err),
        };
        if self.config.existing_ssh_slug().is_some()
            && self.shell.config().ssh_private_key_file.is_none()
        {
            problems.push(String::from(
                "ssh_slug requires ssh_private_key_file: set LETSBAKE_SSH_PRIVATE_KEY_FILE \
                 or add ssh_private_key_file to letsbake.toml",
            ));
        }
        let resolved_directory = match self.key_directory() {
            Ok(directory) => Some(directory),
            Err(problem) => {
                problems.push(problem);
                None
            }
        };
        if !problems.is_empty() {
            return Err(ConfigError::Invalid { problems });
        }

        let state_timeout = self.config.state_timeout()?;
        Ok(StepRunner::new(
            self.steps(state_timeout, resolved_directory.unwrap_or_default()),
        ))
    }

    fn key_directory(&self) -> Result<Utf8PathBuf, String> {
        if let Some(directory) = self.config.key_directory.as_deref() {
            return Ok(Utf8PathBuf::from(directory));
        }
        Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| {
            format!(
                "temporary directory {} is not valid UTF-8: set LETSCLOUD_KEY_DIRECTORY",
                path.display()
            )
        })
    }

    fn steps(&self, state_timeout: Duration, key_directory: Utf8PathBuf) -> Vec<Box<dyn Step>> {
        let settings = InstanceSettings {
            location_slug: self.config.location_slug.clone(),
            plan_slug: self.config.plan_slug.clone(),
            image_slug: self.config.image_slug.clone(),
            hostname: self.config.hostname.clone(),
            label: self.config.label.clone(),
            password_length: self.config.password_length,
            keep_instance: self.config.keep_instance,
        };

        let mut steps: Vec<Box<dyn Step>> = vec![
            Box::new(CreateSshKeyStep::new(
                Arc::clone(&self.provider),
                self.config.existing_ssh_slug().map(str::to_owned),
                key_directory,
            )),
            Box::new(CreateInstanceStep::new(
                Arc::clone(&self.provider),
                settings,
                PollWaiter::new(self.instance_poll_interval, state_timeout),
            )),
            Box::new(ConnectStep::new(
                Arc::clone(&self.shell),
                PollWaiter::new(self.ssh_poll_interval, state_timeout),
            )),
            Box::new(ProvisionStep::new(
                Arc::clone(&self.shell),
                self.provisioners.clone(),
            )),
            Box::new(CleanupTempKeysStep::new(
                Arc::clone(&self.shell),
                self.shell.config().ssh_clear_authorized_keys,
            )),
            Box::new(ShutdownStep::new(Arc::clone(&self.provider))),
        ];
        if self.config.snapshot {
            steps.push(Box::new(SnapshotStep::new(
                Arc::clone(&self.provider),
                self.config.snapshot_name.clone(),
                PollWaiter::new(self.snapshot_poll_interval, state_timeout),
            )));
        }
        steps
    }

    /// Runs the build to completion, unwinding every started step.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] before any step runs when the
    /// configuration is invalid, otherwise the error that halted the chain.
    pub async fn run(&self, ui: Arc<dyn Ui>, cancel: CancelSignal) -> Result<Artifact, BuildError> {
        let mut runner = self.plan()?;
        ui.say("Running LetsCloud builder...");
        tracing::info!(steps = ?runner.step_names(), "starting build");

        let mut state = BuildState::new();
        let ctx = StepContext::new(ui, cancel);
        runner.run(&mut state, &ctx).await;

        if let Some(err) = state.take_error() {
            tracing::info!(error = %err, "build failed");
            return Err(err);
        }
        tracing::info!("build finished");
        Ok(Artifact::from_state(&state))
    }
}
