//! Registers the SSH key the instance is created with.

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempPath;

use crate::error::BuildError;
use crate::provider::Provider;
use crate::runner::{Step, StepAction, StepContext, StepFuture};
use crate::state::BuildState;

use super::{fail, timestamp};

/// Uses a configured key or registers a freshly generated one.
///
/// A generated private key is written to a `0600` temporary file. Cleanup
/// deletes only a key this step created, then removes the file.
pub struct CreateSshKeyStep<P: Provider> {
    provider: Arc<P>,
    existing_slug: Option<String>,
    key_directory: Utf8PathBuf,
    created_slug: Option<String>,
    key_file: Option<TempPath>,
}

impl<P: Provider> CreateSshKeyStep<P> {
    /// Creates the step. With `existing_slug` set no key is created.
    #[must_use]
    pub const fn new(
        provider: Arc<P>,
        existing_slug: Option<String>,
        key_directory: Utf8PathBuf,
    ) -> Self {
        Self {
            provider,
            existing_slug,
            key_directory,
            created_slug: None,
            key_file: None,
        }
    }

    async fn create(&mut self, state: &mut BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        let title = format!("letsbake-ssh-key-{}", timestamp());
        ctx.ui().say("Creating temporary SSH key for instance...");
        let key = self
            .provider
            .create_ssh_key(&title, None)
            .await
            .map_err(|err| BuildError::provider("create SSH key", err))?;
        self.created_slug = Some(key.slug.clone());
        tracing::info!(slug = %key.slug, "registered temporary SSH key");

        if key.private_key.trim().is_empty() {
            return Err(BuildError::KeyFile {
                path: self.key_directory.clone(),
                message: String::from("provider returned no private key"),
            });
        }

        let path = write_private_key(&self.key_directory, &key.private_key)?;
        let utf8_path = Utf8Path::from_path(&path)
            .map(Utf8Path::to_path_buf)
            .ok_or_else(|| BuildError::KeyFile {
                path: self.key_directory.clone(),
                message: String::from("temporary file path is not valid UTF-8"),
            })?;

        state.ssh_key_slug = Some(key.slug);
        state.public_key = Some(key.public_key);
        state.private_key = Some(key.private_key);
        state.private_key_path = Some(utf8_path);
        self.key_file = Some(path);
        Ok(())
    }
}

fn write_private_key(directory: &Utf8Path, contents: &str) -> Result<TempPath, BuildError> {
    let key_error = |err: std::io::Error| BuildError::KeyFile {
        path: directory.to_path_buf(),
        message: err.to_string(),
    };
    let mut file = tempfile::Builder::new()
        .prefix("letsbake-key-")
        .suffix(".pem")
        .tempfile_in(directory)
        .map_err(key_error)?;
    file.write_all(contents.as_bytes()).map_err(key_error)?;
    file.flush().map_err(key_error)?;
    Ok(file.into_temp_path())
}

impl<P: Provider> Step for CreateSshKeyStep<P> {
    fn name(&self) -> &'static str {
        "create_ssh_key"
    }

    fn run<'a>(
        &'a mut self,
        state: &'a mut BuildState,
        ctx: &'a StepContext,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            if let Some(slug) = self.existing_slug.clone() {
                ctx.ui().say(&format!("Using existing SSH key {slug}"));
                state.ssh_key_slug = Some(slug);
                return StepAction::Continue;
            }
            match self.create(state, ctx).await {
                Ok(()) => StepAction::Continue,
                Err(err) => fail(state, ctx, err),
            }
        })
    }

    fn cleanup<'a>(&'a mut self, _state: &'a BuildState, ctx: &'a StepContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            if let Some(slug) = self.created_slug.take() {
                ctx.ui().say("Deleting temporary SSH key...");
                if let Err(err) = self.provider.delete_ssh_key(&slug).await {
                    tracing::warn!(%slug, error = %err, "failed to delete SSH key");
                    ctx.ui().error(&format!(
                        "Error cleaning up SSH key {slug}: {err}. Please delete it manually."
                    ));
                }
            }
            if let Some(path) = self.key_file.take()
                && let Err(err) = path.close()
            {
                tracing::warn!(error = %err, "failed to remove private key file");
                ctx.ui()
                    .error(&format!("Error removing temporary private key file: {err}"));
            }
        })
    }
}
