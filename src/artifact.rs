//! The result of a successful build.
//!
//! An [`Artifact`] is assembled once from the final [`BuildState`] and never
//! changes afterwards. Downstream tooling reads it through [`Artifact::state`]
//! or [`Artifact::to_json`]; [`Artifact::print_on_ui`] renders a summary that
//! never includes the generated password.

use std::fmt;

use camino::Utf8PathBuf;
use serde::Serialize;
use thiserror::Error;

use crate::state::{BuildState, keys};
use crate::ui::Ui;

/// Identifier of the builder that produced an artifact.
pub const BUILDER_ID: &str = "letscloud.letsbake";

/// Errors raised by artifact operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ArtifactError {
    /// Raised when the artifact lacks a value needed to render it.
    #[error("artifact data is incomplete: missing {missing}")]
    Incomplete {
        /// Name of the absent state key.
        missing: &'static str,
    },
    /// Raised when the artifact cannot be encoded as JSON.
    #[error("failed to serialise artifact: {0}")]
    Serialise(String),
}

/// Immutable record of what a build produced.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Artifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_name: Option<String>,
}

impl Artifact {
    /// Captures the values downstream tooling needs from `state`.
    #[must_use]
    pub fn from_state(state: &BuildState) -> Self {
        Self {
            instance_identifier: state.instance_identifier.clone(),
            instance_ip: state.instance_ip.clone(),
            generated_password: state.generated_password.clone(),
            snapshot_slug: state.snapshot_slug.clone(),
            snapshot_name: state.snapshot_name.clone(),
        }
    }

    /// Instance identifier, or `"unknown"` when none was recorded.
    #[must_use]
    pub fn id(&self) -> &str {
        self.instance_identifier.as_deref().unwrap_or("unknown")
    }

    /// Looks up a captured value by state key name.
    ///
    /// The generated password is available here even though it is never
    /// printed.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&str> {
        match name {
            keys::INSTANCE_IDENTIFIER => self.instance_identifier.as_deref(),
            keys::INSTANCE_IP => self.instance_ip.as_deref(),
            keys::GENERATED_PASSWORD => self.generated_password.as_deref(),
            keys::SNAPSHOT_SLUG => self.snapshot_slug.as_deref(),
            keys::SNAPSHOT_NAME => self.snapshot_name.as_deref(),
            _ => None,
        }
    }

    /// Local files produced by the build. Always empty.
    #[must_use]
    pub const fn files(&self) -> &[Utf8PathBuf] {
        &[]
    }

    /// Returns [`BUILDER_ID`].
    #[must_use]
    pub const fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    /// Encodes the captured values as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Serialise`] if encoding fails.
    pub fn to_json(&self) -> Result<String, ArtifactError> {
        serde_json::to_string(self).map_err(|err| ArtifactError::Serialise(err.to_string()))
    }

    /// Does nothing: the instance's lifetime is settled during cleanup.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn destroy(&self) -> Result<(), ArtifactError> {
        Ok(())
    }

    /// Writes a summary of the artifact to `ui`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Incomplete`] without printing any artifact
    /// data when the identifier or IP is missing.
    pub fn print_on_ui(&self, ui: &dyn Ui) -> Result<(), ArtifactError> {
        let (Some(identifier), Some(ip)) = (
            self.instance_identifier.as_deref(),
            self.instance_ip.as_deref(),
        ) else {
            let missing = if self.instance_identifier.is_none() {
                keys::INSTANCE_IDENTIFIER
            } else {
                keys::INSTANCE_IP
            };
            ui.error("Artifact data is incomplete.");
            return Err(ArtifactError::Incomplete { missing });
        };

        ui.say(&format!(
            "Build Artifact:\nInstance Identifier: {identifier}\nInstance IP: {ip}"
        ));
        if let Some(slug) = self.snapshot_slug.as_deref() {
            let name = self.snapshot_name.as_deref().unwrap_or(slug);
            ui.say(&format!("Snapshot: {name} ({slug})"));
        }
        if self.generated_password.is_some() {
            ui.say("A secure password has been generated for the instance.");
        }
        Ok(())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Artifact with ID: {}", self.id())
    }
}
