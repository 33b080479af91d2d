//! Error types for session cache operations.

/// Error type for session cache operations.
///
/// Errors are `Clone` because one in-flight establishment delivers the same
/// outcome to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The credential could not be turned into an identity.
    #[error("Failed to derive identity: {0}")]
    DerivationFailed(String),

    /// The credential is well-formed but the network does not know the identity.
    #[error("Invalid credentials or account is not registered to this network: {network}")]
    AuthInvalid {
        /// Network the identity was looked up on.
        network: String,
    },

    /// Connecting or opening the context failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No entry is cached for the identity.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The cache has been shut down.
    #[error("Session cache is shut down")]
    ShutDown,
}

impl Error {
    /// Whether this error means the credential was rejected by the network.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::AuthInvalid { .. })
    }
}

/// Result type for session cache operations.
pub type Result<T> = std::result::Result<T, Error>;
