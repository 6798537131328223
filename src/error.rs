//! Errors recorded into the build state when a step halts the chain.

use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::password::PasswordError;
use crate::poll::WaitError;

/// Boxed provider error carried inside [`BuildError::Provider`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that halt a build.
///
/// Steps record the first of these into [`crate::BuildState::error`] before
/// returning [`crate::StepAction::Halt`]; the runner only checks presence.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Raised before any step runs when the configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a provider API call fails.
    #[error("failed to {action}: {source}")]
    Provider {
        /// Short description of the attempted call.
        action: String,
        /// Error returned by the provider client.
        #[source]
        source: BoxError,
    },
    /// Raised when a remote resource does not reach the awaited state in time.
    #[error("timed out after {}s waiting for {resource}", elapsed.as_secs())]
    Timeout {
        /// Resource being awaited (for example `instance letsbake-1700000000`).
        resource: String,
        /// Time spent waiting before giving up.
        elapsed: Duration,
    },
    /// Raised when a step needs a value an earlier step should have recorded.
    #[error("build state is missing {key}")]
    MissingState {
        /// Name of the absent state key.
        key: &'static str,
    },
    /// Raised when the instance password cannot be generated.
    #[error("failed to generate instance password: {0}")]
    Password(#[from] PasswordError),
    /// Raised when the temporary private key file cannot be written or read.
    #[error("private key file {path}: {message}")]
    KeyFile {
        /// Location of the key file.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a provisioning script cannot be read locally.
    #[error("failed to read provisioning script {path}: {message}")]
    Script {
        /// Location of the script.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command run over SSH fails.
    #[error("remote command failed: {message}")]
    Remote {
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when the build is interrupted.
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    /// Wraps a provider error with the action that produced it.
    pub fn provider(
        action: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Provider {
            action: action.into(),
            source: Box::new(source),
        }
    }

    /// Converts a poll failure into a build error for `resource`.
    pub(crate) fn from_wait<E>(action: &str, err: WaitError<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match err {
            WaitError::Query(source) => Self::provider(action, source),
            WaitError::Timeout { resource, elapsed } => Self::Timeout { resource, elapsed },
            WaitError::Cancelled => Self::Cancelled,
        }
    }
}
