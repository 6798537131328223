//! Error types for the LetsCloud client.

use thiserror::Error;

/// Errors raised by [`super::LetsCloudClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LetsCloudError {
    /// Raised when the client is constructed with unusable settings.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the request never produced a response.
    #[error("request to {path} failed: {message}")]
    Http {
        /// API path that was requested.
        path: String,
        /// Transport error string.
        message: String,
    },
    /// Raised when the API answers with an error status or `success: false`.
    #[error("LetsCloud API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
    /// Raised when a successful response cannot be decoded.
    #[error("could not decode LetsCloud response: {message}")]
    Decode {
        /// Decoder error string.
        message: String,
    },
    /// Raised when a request timeout of zero is requested.
    #[error("request timeout must be greater than zero")]
    InvalidTimeout,
}
