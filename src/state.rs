//! Mutable context threaded through every build step.
//!
//! Each well-known key is an explicit optional field. Steps fill the fields in
//! as the chain progresses and read what earlier steps recorded; absence of a
//! required value is a local precondition failure, never a panic.

use camino::Utf8PathBuf;

use crate::error::BuildError;
use crate::runner::StepAction;

/// State key names accepted by [`BuildState::get`].
pub mod keys {
    /// Slug of the SSH key registered with the provider.
    pub const SSH_KEY_SLUG: &str = "ssh_key_slug";
    /// Private key material of a generated key.
    pub const PRIVATE_KEY: &str = "private_key";
    /// Public key of a generated key.
    pub const PUBLIC_KEY: &str = "public_key";
    /// Path of the file holding the generated private key.
    pub const PRIVATE_KEY_PATH: &str = "private_key_path";
    /// Provider identifier of the created instance.
    pub const INSTANCE_IDENTIFIER: &str = "instance_identifier";
    /// Primary IP address of the created instance.
    pub const INSTANCE_IP: &str = "instance_ip";
    /// Root password generated for the instance.
    pub const GENERATED_PASSWORD: &str = "generated_password";
    /// Slug of the snapshot taken after provisioning.
    pub const SNAPSHOT_SLUG: &str = "snapshot_slug";
    /// Label given to the snapshot.
    pub const SNAPSHOT_NAME: &str = "snapshot_name";
}

/// Values shared between steps during a single build.
#[derive(Debug, Default)]
pub struct BuildState {
    /// Slug of the SSH key used for the instance.
    pub ssh_key_slug: Option<String>,
    /// Private key material when the key was generated by this build.
    pub private_key: Option<String>,
    /// Public key when the key was generated by this build.
    pub public_key: Option<String>,
    /// Location of the temporary private key file.
    pub private_key_path: Option<Utf8PathBuf>,
    /// Provider identifier of the instance.
    pub instance_identifier: Option<String>,
    /// Primary IP address of the instance.
    pub instance_ip: Option<String>,
    /// Root password generated for the instance.
    pub generated_password: Option<String>,
    /// Slug of the snapshot, when one was taken.
    pub snapshot_slug: Option<String>,
    /// Label of the snapshot, when one was taken.
    pub snapshot_name: Option<String>,
    /// First error that halted the chain.
    pub error: Option<BuildError>,
}

impl BuildState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a string-valued entry by key name.
    ///
    /// Unknown keys and unset entries both yield `None`. The `error` entry is
    /// not string-valued; use [`BuildState::has_error`] instead.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            keys::SSH_KEY_SLUG => self.ssh_key_slug.as_deref(),
            keys::PRIVATE_KEY => self.private_key.as_deref(),
            keys::PUBLIC_KEY => self.public_key.as_deref(),
            keys::PRIVATE_KEY_PATH => self.private_key_path.as_deref().map(|path| path.as_str()),
            keys::INSTANCE_IDENTIFIER => self.instance_identifier.as_deref(),
            keys::INSTANCE_IP => self.instance_ip.as_deref(),
            keys::GENERATED_PASSWORD => self.generated_password.as_deref(),
            keys::SNAPSHOT_SLUG => self.snapshot_slug.as_deref(),
            keys::SNAPSHOT_NAME => self.snapshot_name.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` once any step has recorded an error.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Records `err` and returns [`StepAction::Halt`].
    ///
    /// The first recorded error wins; later ones are dropped so the caller
    /// sees the failure that stopped the chain.
    pub fn halt(&mut self, err: BuildError) -> StepAction {
        if self.error.is_none() {
            self.error = Some(err);
        }
        StepAction::Halt
    }

    /// Removes and returns the recorded error.
    pub fn take_error(&mut self) -> Option<BuildError> {
        self.error.take()
    }

    /// Returns the instance identifier or a [`BuildError::MissingState`].
    ///
    /// # Errors
    ///
    /// Fails when no instance identifier has been recorded.
    pub fn require_instance_identifier(&self) -> Result<&str, BuildError> {
        self.instance_identifier
            .as_deref()
            .ok_or(BuildError::MissingState {
                key: keys::INSTANCE_IDENTIFIER,
            })
    }

    /// Returns the instance IP or a [`BuildError::MissingState`].
    ///
    /// # Errors
    ///
    /// Fails when no instance IP has been recorded.
    pub fn require_instance_ip(&self) -> Result<&str, BuildError> {
        self.instance_ip.as_deref().ok_or(BuildError::MissingState {
            key: keys::INSTANCE_IP,
        })
    }

    /// Returns the SSH key slug or a [`BuildError::MissingState`].
    ///
    /// # Errors
    ///
    /// Fails when no SSH key slug has been recorded.
    pub fn require_ssh_key_slug(&self) -> Result<&str, BuildError> {
        self.ssh_key_slug.as_deref().ok_or(BuildError::MissingState {
            key: keys::SSH_KEY_SLUG,
        })
    }
}
