//! SSH communicator settings and the errors remote execution can raise.
//!
//! [`CommConfig`] is loaded via `ortho-config`, merging defaults, the
//! `letsbake.toml` configuration file, and `LETSBAKE_*` environment
//! variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default SSH port of freshly built instances.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Seconds the SSH client waits for the TCP connection before giving up.
pub const DEFAULT_SSH_CONNECT_TIMEOUT: u64 = 10;

/// How the build reaches the instance over SSH.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LETSBAKE",
    discovery(
        app_name = "letsbake",
        env_var = "LETSBAKE_CONFIG_PATH",
        config_file_name = "letsbake.toml",
        dotfile_name = ".letsbake.toml",
        project_file_name = "letsbake.toml"
    )
)]
pub struct CommConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_username: String,
    /// SSH port on the instance.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Seconds passed to SSH as `ConnectTimeout`; `0` leaves the client's
    /// own default in place.
    #[ortho_config(default = 10)]
    pub ssh_connect_timeout: u64,
    /// Whether to force batch mode to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; off by default for throwaway
    /// build hosts.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Private key used when the build does not generate its own key pair.
    /// Supports tilde expansion. Required when an existing SSH key slug is
    /// configured.
    pub ssh_private_key_file: Option<String>,
    /// Whether to strip the generated public key from the instance's
    /// `authorized_keys` before the image is captured.
    #[ortho_config(default = false)]
    pub ssh_clear_authorized_keys: bool,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            ssh_username: String::from("root"),
            ssh_port: DEFAULT_SSH_PORT,
            ssh_connect_timeout: DEFAULT_SSH_CONNECT_TIMEOUT,
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            ssh_private_key_file: None,
            ssh_clear_authorized_keys: false,
        }
    }
}

/// Errors raised when loading the communicator configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CommConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

impl CommConfig {
    /// Loads configuration from defaults, configuration files, and
    /// environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CommConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, CommConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("letsbake")])
            .map_err(|err| CommConfigLoadError::Parse(err.to_string()))
    }

    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] naming the first empty field.
    pub fn validate(&self) -> Result<(), RemoteError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.ssh_username, "ssh_username")?;
        Self::require_optional_value(self.ssh_private_key_file.as_deref(), "ssh_private_key_file")?;
        if self.ssh_port == 0 {
            return Err(RemoteError::InvalidConfig {
                field: String::from("ssh_port"),
            });
        }
        Ok(())
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), RemoteError> {
        match value {
            None => Ok(()),
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(RemoteError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), RemoteError> {
        Self::require_optional_value(Some(value), field)
    }
}

/// Errors surfaced while running commands on the instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set LETSBAKE_{env_suffix} or add {field} to letsbake.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the remote command exits unsuccessfully.
    #[error("`{command}` exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command that was run on the instance.
        command: String,
        /// Exit status as reported by SSH.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}
