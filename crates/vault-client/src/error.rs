//! Client error types.

use thiserror::Error;
use vault_session::FactoryError;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage node returned an error response.
    #[error("API error ({status}): {error}: {reason}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from the storage node.
        error: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Database or context not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The private key is not usable.
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// The context was closed.
    #[error("Context closed: {0}")]
    ContextClosed(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_)) || matches!(self, Error::Api { status: 401, .. })
    }
}

impl From<Error> for FactoryError {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound(msg) => FactoryError::NotRegistered(msg),
            Error::InvalidKey(msg) => FactoryError::MalformedCredential(msg),
            other => FactoryError::Transport(other.to_string()),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error body returned by the storage node.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub reason: String,
}
