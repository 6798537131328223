//! Wire types for the LetsCloud REST API.

use serde::{Deserialize, Serialize};

/// Body wrapper used by every LetsCloud response.
#[derive(Debug, Deserialize)]
pub(super) struct Envelope<T> {
    #[serde(default)]
    pub(super) success: bool,
    pub(super) message: Option<String>,
    pub(super) data: Option<T>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSshKeyBody<'a> {
    pub(super) title: &'a str,
    pub(super) key: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSnapshotBody<'a> {
    pub(super) label: &'a str,
    pub(super) instance_identifier: &'a str,
}
