//! Remote command execution on the build instance over SSH.
//!
//! Commands are passed to the system `ssh` client through a
//! [`CommandRunner`], so tests can script outcomes without spawning
//! processes. Remote exit codes are preserved in [`CommandOutput`].

use std::ffi::OsString;

mod commands;
mod config;
mod types;
mod util;

pub use commands::{remove_authorized_key_command, script_command};
pub use config::{
    CommConfig, CommConfigLoadError, DEFAULT_SSH_CONNECT_TIMEOUT, DEFAULT_SSH_PORT, RemoteError,
};
pub use types::{CommandFuture, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use util::expand_tilde;

/// Runs commands on a host using the configured SSH settings.
#[derive(Clone, Debug)]
pub struct RemoteShell<R: CommandRunner> {
    config: CommConfig,
    runner: R,
}

impl RemoteShell<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: CommConfig) -> Result<Self, RemoteError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> RemoteShell<R> {
    /// Creates a shell using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(config: CommConfig, runner: R) -> Result<Self, RemoteError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &CommConfig {
        &self.config
    }

    /// Executes `command` on `host` and returns its output, whatever the exit
    /// status.
    ///
    /// `identity_file` takes precedence over the configured private key.
    ///
    /// # Errors
    ///
    /// Propagates failures to spawn the SSH client.
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the remote login shell; callers quote
    /// untrusted input before calling.
    pub async fn run(
        &self,
        host: &str,
        identity_file: Option<&str>,
        command: &str,
    ) -> Result<CommandOutput, RemoteError> {
        let args = self.build_ssh_args(host, identity_file, command);
        tracing::debug!(host, program = %self.config.ssh_bin, "running remote command");
        self.runner.run(&self.config.ssh_bin, &args).await
    }

    /// Like [`RemoteShell::run`] but treats a non-zero exit as an error.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::CommandFailure`] when the remote command exits
    /// unsuccessfully, in addition to the failures of [`RemoteShell::run`].
    pub async fn run_checked(
        &self,
        host: &str,
        identity_file: Option<&str>,
        command: &str,
    ) -> Result<CommandOutput, RemoteError> {
        let output = self.run(host, identity_file, command).await?;
        if output.is_success() {
            return Ok(output);
        }
        Err(RemoteError::CommandFailure {
            command: command.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr,
        })
    }

    fn build_ssh_args(
        &self,
        host: &str,
        identity_file: Option<&str>,
        command: &str,
    ) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
        ];

        if self.config.ssh_connect_timeout > 0 {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "ConnectTimeout={}",
                self.config.ssh_connect_timeout
            )));
        }

        let identity = identity_file
            .map(str::to_owned)
            .or_else(|| self.config.ssh_private_key_file.as_deref().map(expand_tilde));
        if let Some(path) = identity {
            args.push(OsString::from("-i"));
            args.push(OsString::from(path));
            args.push(OsString::from("-o"));
            args.push(OsString::from("IdentitiesOnly=yes"));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from(format!(
            "{}@{host}",
            self.config.ssh_username
        )));
        args.push(OsString::from(command));
        args
    }
}
