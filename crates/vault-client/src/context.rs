//! An opened per-identity context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::client::{NetworkClient, database_name};
use crate::datastore::Datastore;
use crate::error::{Error, Result};

/// A context opened for one identity.
///
/// Datastores opened from a context share its closed flag, so closing the
/// context makes every datastore reject further queries.
pub struct Context {
    client: NetworkClient,
    name: String,
    did: String,
    database: String,
    closed: Arc<AtomicBool>,
}

impl Context {
    pub(crate) fn new(client: NetworkClient, name: String, did: String, database: String) -> Self {
        Self {
            client,
            name,
            did,
            database,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity that owns the context.
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Backing database of the context itself.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Whether [`Context::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Open the datastore holding records of `schema_url`.
    pub fn open_datastore(&self, schema_url: &str) -> Result<Datastore> {
        self.ensure_open()?;
        let database = database_name(&[&self.did.to_lowercase(), &self.name, schema_url]);
        Ok(Datastore::new(
            self.client.clone(),
            schema_url.to_string(),
            database,
            self.closed.clone(),
        ))
    }

    /// Close the context. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(did = %self.did, context = %self.name, "Closed context");
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ContextClosed(self.name.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("did", &self.did)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        let client = NetworkClient::builder()
            .endpoint("http://127.0.0.1:5984")
            .build()
            .unwrap();
        Context::new(
            client,
            "Verida: Vault".into(),
            "did:vda:mainnet:0x0000000000000000000000000000000000000001".into(),
            "vcontext".into(),
        )
    }

    #[test]
    fn test_datastores_differ_per_schema() {
        let ctx = context();
        let posts = ctx.open_datastore("https://example.com/post/schema.json").unwrap();
        let mail = ctx.open_datastore("https://example.com/email/schema.json").unwrap();
        assert_ne!(posts.database(), mail.database());
        assert_eq!(posts.schema_url(), "https://example.com/post/schema.json");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_datastores() {
        let ctx = context();
        let store = ctx.open_datastore("https://example.com/post/schema.json").unwrap();
        ctx.close().await.unwrap();
        ctx.close().await.unwrap();
        assert!(ctx.is_closed());
        assert!(matches!(
            ctx.open_datastore("https://example.com/post/schema.json"),
            Err(Error::ContextClosed(_))
        ));
        assert!(matches!(
            store.row_count().await,
            Err(Error::ContextClosed(_))
        ));
    }
}
