//! LetsCloud REST client implementing [`Provider`].
//!
//! Every response body is wrapped in `{ "success": bool, "data": ... }`. A
//! non-2xx status or `success: false` becomes [`LetsCloudError::Api`].

mod error;
mod types;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::provider::{
    CreateInstanceRequest, Instance, Provider, ProviderFuture, Snapshot, SnapshotHandle, SshKey,
};
use types::{CreateSnapshotBody, CreateSshKeyBody, Envelope};

pub use error::LetsCloudError;

/// Production API endpoint.
pub const LETSCLOUD_API_BASE: &str = "https://core.letscloud.io/api";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("letsbake/", env!("CARGO_PKG_VERSION"));

/// Authenticated client for the LetsCloud API.
#[derive(Debug)]
pub struct LetsCloudClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    request_timeout: Mutex<Duration>,
}

impl LetsCloudClient {
    /// Creates a client for the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LetsCloudError::Config`] when `api_key` is blank or the
    /// HTTP backend cannot be initialised.
    pub fn new(api_key: &str) -> Result<Self, LetsCloudError> {
        if api_key.trim().is_empty() {
            return Err(LetsCloudError::Config(String::from(
                "API key is empty: set LETSCLOUD_API_KEY or add api_key to letsbake.toml",
            )));
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| LetsCloudError::Config(format!("HTTP client setup failed: {err}")))?;
        Ok(Self {
            http,
            api_key: api_key.to_owned(),
            base_url: LETSCLOUD_API_BASE.to_owned(),
            request_timeout: Mutex::new(DEFAULT_REQUEST_TIMEOUT),
        })
    }

    /// Points the client at another endpoint, such as a local mock.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.trim_end_matches('/').clone_into(&mut self.base_url);
        self
    }

    /// Timeout applied to each request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        *self
            .request_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{path}", self.base_url))
            .header("api-token", &self.api_key)
            .header("Accept", "application/json")
            .timeout(self.request_timeout())
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, LetsCloudError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        fetch(path, self.request(Method::POST, path).json(body)).await
    }
}

async fn fetch<T: DeserializeOwned>(path: &str, builder: RequestBuilder) -> Result<T, LetsCloudError> {
    let (status, body) = send(path, builder).await?;
    decode_data(status, &body)
}

async fn execute(path: &str, builder: RequestBuilder) -> Result<(), LetsCloudError> {
    let (status, body) = send(path, builder).await?;
    decode_ack(status, &body)
}

async fn send(path: &str, builder: RequestBuilder) -> Result<(u16, String), LetsCloudError> {
    tracing::debug!(path, "calling LetsCloud API");
    let response = builder.send().await.map_err(|err| LetsCloudError::Http {
        path: path.to_owned(),
        message: err.to_string(),
    })?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|err| LetsCloudError::Http {
        path: path.to_owned(),
        message: err.to_string(),
    })?;
    Ok((status, body))
}

const fn is_success_status(status: u16) -> bool {
    matches!(status, 200..=299)
}

fn api_error(status: u16, message: Option<String>, body: &str) -> LetsCloudError {
    let text = message
        .filter(|msg| !msg.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_owned());
    LetsCloudError::Api {
        status,
        message: if text.is_empty() {
            String::from("no error message")
        } else {
            text
        },
    }
}

/// Decodes the `data` member of a LetsCloud response.
fn decode_data<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, LetsCloudError> {
    let envelope: Result<Envelope<T>, _> = serde_json::from_str(body);
    if !is_success_status(status) {
        let message = envelope.ok().and_then(|env| env.message);
        return Err(api_error(status, message, body));
    }
    let decoded = envelope.map_err(|err| LetsCloudError::Decode {
        message: err.to_string(),
    })?;
    if !decoded.success {
        return Err(api_error(status, decoded.message, body));
    }
    decoded.data.ok_or_else(|| LetsCloudError::Decode {
        message: String::from("response carried no data"),
    })
}

/// Checks a response whose payload is irrelevant. Empty bodies are accepted.
fn decode_ack(status: u16, body: &str) -> Result<(), LetsCloudError> {
    if body.trim().is_empty() {
        return if is_success_status(status) {
            Ok(())
        } else {
            Err(api_error(status, None, body))
        };
    }
    let envelope: Result<Envelope<serde_json::Value>, _> = serde_json::from_str(body);
    match envelope {
        Ok(decoded) if is_success_status(status) && decoded.success => Ok(()),
        Ok(decoded) => Err(api_error(status, decoded.message, body)),
        Err(_) if is_success_status(status) => Ok(()),
        Err(_) => Err(api_error(status, None, body)),
    }
}

impl Provider for LetsCloudClient {
    type Error = LetsCloudError;

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let path = "instances";
            execute(path, self.request(Method::POST, path).json(request)).await
        })
    }

    fn list_instances(&self) -> ProviderFuture<'_, Vec<Instance>, Self::Error> {
        Box::pin(async move {
            let path = "instances";
            fetch(path, self.request(Method::GET, path)).await
        })
    }

    fn delete_instance<'a>(&'a self, identifier: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let path = format!("instances/{identifier}");
            execute(&path, self.request(Method::DELETE, &path)).await
        })
    }

    fn power_off_instance<'a>(
        &'a self,
        identifier: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let path = format!("instances/{identifier}/power-off");
            execute(&path, self.request(Method::PUT, &path)).await
        })
    }

    fn create_ssh_key<'a>(
        &'a self,
        title: &'a str,
        public_key: Option<&'a str>,
    ) -> ProviderFuture<'a, SshKey, Self::Error> {
        Box::pin(async move {
            let body = CreateSshKeyBody {
                title,
                key: public_key.unwrap_or_default(),
            };
            self.post_json("ssh-keys", &body).await
        })
    }

    fn delete_ssh_key<'a>(&'a self, slug: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let path = format!("ssh-keys/{slug}");
            execute(&path, self.request(Method::DELETE, &path)).await
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        label: &'a str,
        instance_identifier: &'a str,
    ) -> ProviderFuture<'a, SnapshotHandle, Self::Error> {
        Box::pin(async move {
            let body = CreateSnapshotBody {
                label,
                instance_identifier,
            };
            self.post_json("snapshots", &body).await
        })
    }

    fn get_snapshot<'a>(&'a self, slug: &'a str) -> ProviderFuture<'a, Snapshot, Self::Error> {
        Box::pin(async move {
            let path = format!("snapshots/{slug}");
            fetch(&path, self.request(Method::GET, &path)).await
        })
    }

    fn set_request_timeout(&self, timeout: Duration) -> Result<(), Self::Error> {
        if timeout.is_zero() {
            return Err(LetsCloudError::InvalidTimeout);
        }
        *self
            .request_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = timeout;
        Ok(())
    }
}
