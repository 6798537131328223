//! Core library for the letsbake image builder.
//!
//! The crate bakes LetsCloud images by driving a fixed chain of lifecycle
//! steps (create SSH key → create instance → connect → provision → clear
//! temporary keys → shut down → optional snapshot). Every step that starts
//! is cleaned up in reverse order, whether the chain completes or halts.

pub mod artifact;
pub mod builder;
pub mod cancel;
pub mod config;
pub mod error;
pub mod letscloud;
pub mod password;
pub mod poll;
pub mod provider;
pub mod remote;
pub mod runner;
pub mod state;
pub mod steps;
pub mod test_support;
pub mod ui;

pub use artifact::{Artifact, ArtifactError, BUILDER_ID};
pub use builder::Builder;
pub use cancel::{CancelSignal, CancelTrigger, cancellation};
pub use config::{BuildConfig, ConfigError};
pub use error::BuildError;
pub use letscloud::{LetsCloudClient, LetsCloudError};
pub use password::{EntropySource, OsEntropy, PasswordError, generate_password};
pub use poll::{PollWaiter, Readiness, WaitError};
pub use provider::{
    CreateInstanceRequest, Instance, IpAddress, Provider, ProviderFuture, Snapshot,
    SnapshotHandle, SshKey,
};
pub use remote::{CommConfig, CommConfigLoadError, ProcessCommandRunner, RemoteShell};
pub use runner::{Step, StepAction, StepContext, StepFuture, StepRunner};
pub use state::BuildState;
pub use ui::{ConsoleUi, Ui};
