//! The seam between the cache and whatever actually opens sessions.
//!
//! The cache never talks to the network itself. A [`SessionFactory`] turns a
//! credential into a stable identity and, on a cache miss, establishes a new
//! session for it. The associated `Session` type is what the cache stores and
//! hands out to callers, shared behind an `Arc`.

use async_trait::async_trait;

use crate::error::Error;

/// Failure reported by a [`SessionFactory`] or a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    /// The network could not locate the identity (unregistered account).
    #[error("Unable to locate identity: {0}")]
    NotRegistered(String),

    /// The credential is not in a usable format.
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// Any other transport, configuration or context failure.
    #[error("{0}")]
    Transport(String),
}

impl FactoryError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Whether this failure means the identity is unknown to the network.
    ///
    /// Some backends only report this condition through their message text,
    /// so transport errors mentioning "Unable to locate" count as well.
    pub fn is_not_registered(&self) -> bool {
        match self {
            FactoryError::NotRegistered(_) => true,
            FactoryError::Transport(msg) => msg.contains("Unable to locate"),
            FactoryError::MalformedCredential(_) => false,
        }
    }

    /// Translate an establishment failure into the cache's error taxonomy.
    pub(crate) fn into_establish_error(self, network: &str) -> Error {
        if self.is_not_registered() {
            return Error::AuthInvalid {
                network: network.to_string(),
            };
        }
        match self {
            FactoryError::MalformedCredential(msg) => Error::DerivationFailed(msg),
            other => Error::ConnectionFailed(other.to_string()),
        }
    }
}

/// An established, reusable connection bundle for one identity.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Identity this session was established for.
    fn identity(&self) -> &str;

    /// Close the session.
    ///
    /// The cache calls this at most once per session, after no caller can
    /// obtain it from the cache any more.
    async fn close(&self) -> std::result::Result<(), FactoryError>;
}

/// Produces sessions for the cache.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    /// The session type stored in the cache.
    type Session: Session;

    /// Name of the network sessions are opened on. Used in auth errors.
    fn network(&self) -> &str;

    /// Derive the cache key for a credential.
    ///
    /// Must be deterministic: the same credential always yields the same identity.
    async fn derive_identity(&self, credential: &str) -> std::result::Result<String, FactoryError>;

    /// Connect to the network and open a context for `identity`.
    async fn establish(
        &self,
        credential: &str,
        identity: &str,
    ) -> std::result::Result<Self::Session, FactoryError>;
}
