//! Provider abstraction for the instances, SSH keys, and snapshots a build
//! touches.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Parameters for creating an instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateInstanceRequest {
    /// Datacenter location (for example `MIA1`).
    pub location_slug: String,
    /// Plan (size) slug.
    pub plan_slug: String,
    /// Hostname assigned to the instance.
    pub hostname: String,
    /// Label shown in the provider console; used to find the instance again.
    pub label: String,
    /// Boot image slug.
    pub image_slug: String,
    /// Slug of the SSH key to install.
    pub ssh_slug: String,
    /// Root password.
    pub password: String,
}

/// IP address attached to an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct IpAddress {
    /// Address in text form.
    pub address: String,
}

/// Instance as reported by the provider.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Instance {
    /// Provider identifier.
    pub identifier: String,
    /// Label given at creation.
    pub label: String,
    /// Hostname given at creation.
    pub hostname: String,
    /// Whether the instance finished building.
    pub built: bool,
    /// Whether the instance is locked by a pending operation.
    pub locked: bool,
    /// Whether the instance is suspended.
    pub suspended: bool,
    /// Addresses attached to the instance, primary first.
    pub ip_addresses: Vec<IpAddress>,
}

impl Instance {
    /// Returns `true` when the instance is built, unlocked, and running.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.built && !self.locked && !self.suspended
    }

    /// Primary IP address, if any.
    #[must_use]
    pub fn primary_ip(&self) -> Option<&str> {
        self.ip_addresses.first().map(|ip| ip.address.as_str())
    }
}

/// SSH key registered with the provider.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct SshKey {
    /// Provider slug used to reference the key.
    pub slug: String,
    /// Key title.
    pub title: String,
    /// Public key in OpenSSH format.
    pub public_key: String,
    /// Private key material; only present for provider-generated keys.
    pub private_key: String,
}

/// Handle returned when a snapshot is requested.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct SnapshotHandle {
    /// Provider slug of the snapshot.
    pub slug: String,
}

/// Snapshot as reported by the provider.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Snapshot {
    /// Provider slug.
    pub slug: String,
    /// Label given at creation.
    pub label: String,
    /// Whether the snapshot finished building.
    pub build: bool,
}

/// Operations the build needs from a cloud provider.
///
/// Implementations must tolerate sequential reuse across steps; the build
/// never calls them concurrently.
pub trait Provider: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submits an instance creation request.
    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> ProviderFuture<'a, (), Self::Error>;

    /// Lists all instances visible to the account.
    fn list_instances(&self) -> ProviderFuture<'_, Vec<Instance>, Self::Error>;

    /// Deletes an instance by identifier.
    fn delete_instance<'a>(&'a self, identifier: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Powers an instance off.
    fn power_off_instance<'a>(
        &'a self,
        identifier: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error>;

    /// Registers an SSH key. With no public key the provider generates a pair
    /// and returns the private half.
    fn create_ssh_key<'a>(
        &'a self,
        title: &'a str,
        public_key: Option<&'a str>,
    ) -> ProviderFuture<'a, SshKey, Self::Error>;

    /// Deletes an SSH key by slug.
    fn delete_ssh_key<'a>(&'a self, slug: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Requests a snapshot of an instance.
    fn create_snapshot<'a>(
        &'a self,
        label: &'a str,
        instance_identifier: &'a str,
    ) -> ProviderFuture<'a, SnapshotHandle, Self::Error>;

    /// Fetches the current state of a snapshot.
    fn get_snapshot<'a>(&'a self, slug: &'a str) -> ProviderFuture<'a, Snapshot, Self::Error>;

    /// Changes the timeout applied to subsequent requests.
    ///
    /// # Errors
    ///
    /// Implementations reject timeouts they cannot honour.
    fn set_request_timeout(&self, timeout: Duration) -> Result<(), Self::Error>;
}
