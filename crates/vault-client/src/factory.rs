//! Session factory backed by the storage network.

use async_trait::async_trait;
use tracing::info;
use vault_session::{FactoryError, Session, SessionFactory};

use crate::account::Account;
use crate::client::NetworkClient;
use crate::context::Context;

/// An established session: network handle, opened context, account and identity.
#[derive(Debug)]
pub struct VaultSession {
    network: NetworkClient,
    context: Context,
    account: Account,
    did: String,
}

impl VaultSession {
    /// Network client the session was opened with.
    pub fn network(&self) -> &NetworkClient {
        &self.network
    }

    /// The opened context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The account.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// The session identity.
    pub fn did(&self) -> &str {
        &self.did
    }
}

#[async_trait]
impl Session for VaultSession {
    fn identity(&self) -> &str {
        &self.did
    }

    async fn close(&self) -> Result<(), FactoryError> {
        self.context.close().await.map_err(FactoryError::from)
    }
}

/// Opens [`VaultSession`]s for private keys.
pub struct VaultSessionFactory {
    client: NetworkClient,
    context_name: String,
}

impl VaultSessionFactory {
    /// Create a factory opening `context_name` through `client`.
    pub fn new(client: NetworkClient, context_name: impl Into<String>) -> Self {
        Self {
            client,
            context_name: context_name.into(),
        }
    }

    /// Context every session opens.
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// The underlying client.
    pub fn client(&self) -> &NetworkClient {
        &self.client
    }
}

#[async_trait]
impl SessionFactory for VaultSessionFactory {
    type Session = VaultSession;

    fn network(&self) -> &str {
        self.client.network().as_str()
    }

    async fn derive_identity(&self, credential: &str) -> Result<String, FactoryError> {
        let account = Account::from_private_key(credential, self.client.network())?;
        Ok(account.did().to_string())
    }

    async fn establish(&self, credential: &str, identity: &str) -> Result<VaultSession, FactoryError> {
        let account = Account::from_private_key(credential, self.client.network())?;
        self.client.connect(&account).await?;
        let context = self
            .client
            .open_context(&account, &self.context_name)
            .await?;

        info!(did = %identity, context = %self.context_name, "Session established");
        Ok(VaultSession {
            network: self.client.clone(),
            context,
            account,
            did: identity.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use serde_json::json;
    use vault_session::{CacheConfig, Error as CacheError, SessionCache};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn factory(server: &MockServer) -> VaultSessionFactory {
        let client = NetworkClient::builder()
            .network(Network::Banksia)
            .endpoint(server.uri())
            .build()
            .unwrap();
        VaultSessionFactory::new(client, "Verida: Vault")
    }

    #[tokio::test]
    async fn test_derive_identity_rejects_bad_key() {
        let server = MockServer::start().await;
        let err = factory(&server).derive_identity("nope").await.unwrap_err();
        assert!(matches!(err, FactoryError::MalformedCredential(_)));
    }

    #[tokio::test]
    async fn test_establish_and_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"doc_count": 1})))
            .mount(&server)
            .await;

        let factory = factory(&server);
        let did = factory.derive_identity(KEY).await.unwrap();
        let session = factory.establish(KEY, &did).await.unwrap();
        assert_eq!(session.identity(), did);
        assert_eq!(session.context().name(), "Verida: Vault");

        session.close().await.unwrap();
        assert!(session.context().is_closed());
    }

    #[tokio::test]
    async fn test_missing_context_is_auth_invalid_through_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"couchdb": "Welcome"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": "not_found", "reason": "missing"})),
            )
            .mount(&server)
            .await;

        let cache = SessionCache::new(factory(&server), CacheConfig::default());
        let err = cache.acquire(KEY, "req-1").await.unwrap_err();
        assert_eq!(
            err,
            CacheError::AuthInvalid {
                network: "banksia".into()
            }
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_connection_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cache = SessionCache::new(factory(&server), CacheConfig::default());
        let err = cache.acquire(KEY, "req-1").await.unwrap_err();
        assert!(matches!(err, CacheError::ConnectionFailed(_)));
    }
}
