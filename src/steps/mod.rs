//! The lifecycle steps of an image build.
//!
//! Steps share the provider and the remote shell through [`Arc`]s and talk to
//! each other only through [`BuildState`].

use std::sync::Arc;

use camino::Utf8Path;

use crate::error::BuildError;
use crate::remote::{CommandRunner, RemoteError, RemoteShell};
use crate::runner::{StepAction, StepContext};
use crate::state::BuildState;

mod cleanup_keys;
mod connect;
mod instance;
mod provision;
mod shutdown;
mod snapshot;
mod ssh_key;

pub use cleanup_keys::CleanupTempKeysStep;
pub use connect::ConnectStep;
pub use instance::{CreateInstanceStep, InstanceSettings};
pub use provision::{ProvisionStep, Provisioners};
pub use shutdown::{REQUEST_TIMEOUT, ShutdownStep};
pub use snapshot::SnapshotStep;
pub use ssh_key::CreateSshKeyStep;

/// Shared handle to the remote shell.
pub type SharedShell<R> = Arc<RemoteShell<R>>;

/// Reports `err` through the UI and records it as the halting error.
fn fail(state: &mut BuildState, ctx: &StepContext, err: BuildError) -> StepAction {
    tracing::warn!(error = %err, "step failed");
    ctx.ui().error(&err.to_string());
    state.halt(err)
}

/// Current Unix timestamp used to make names unique.
fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Private key generated by this build, if any.
fn identity(state: &BuildState) -> Option<&str> {
    state.private_key_path.as_deref().map(Utf8Path::as_str)
}

fn remote_error(err: &RemoteError) -> BuildError {
    BuildError::Remote {
        message: err.to_string(),
    }
}

/// Runs `command` on the instance, abandoning it when the build is cancelled.
async fn run_remote<R: CommandRunner>(
    shell: &RemoteShell<R>,
    state: &BuildState,
    ctx: &StepContext,
    command: &str,
) -> Result<(), BuildError> {
    let host = state.require_instance_ip()?;
    tokio::select! {
        biased;
        () = ctx.cancel().cancelled() => Err(BuildError::Cancelled),
        outcome = shell.run_checked(host, identity(state), command) => {
            outcome.map(drop).map_err(|err| remote_error(&err))
        }
    }
}

#[cfg(test)]
mod tests;
