//! Network client for the storage node.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::account::Account;
use crate::context::Context;
use crate::datastore::DbInfo;
use crate::error::{Error, ErrorResponse, Result};
use crate::network::Network;

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Storage node greeting returned by the endpoint root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    /// Welcome banner.
    #[serde(default)]
    pub couchdb: Option<String>,
    /// Server version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Client for one storage network.
///
/// # Example
///
/// ```no_run
/// use vault_client::{Account, Network, NetworkClient};
///
/// # async fn example() -> vault_client::Result<()> {
/// let client = NetworkClient::builder()
///     .network(Network::Banksia)
///     .endpoint("http://127.0.0.1:5984")
///     .build()?;
///
/// let account = Account::from_private_key(&"11".repeat(32), Network::Banksia)?;
/// client.connect(&account).await?;
/// let context = client.open_context(&account, "Verida: Vault").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NetworkClient {
    inner: Arc<ClientInner>,
}

/// Shared across clones.
struct ClientInner {
    http: reqwest::Client,
    endpoint: Url,
    network: Network,
    timeout: Duration,
}

impl NetworkClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Storage endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Network this client talks to.
    pub fn network(&self) -> Network {
        self.inner.network
    }

    /// Probe the storage endpoint on behalf of `account`.
    pub async fn connect(&self, account: &Account) -> Result<ServerInfo> {
        if account.network() != self.inner.network {
            return Err(Error::Config(format!(
                "account is on {} but client is on {}",
                account.network(),
                self.inner.network
            )));
        }
        let info: ServerInfo = self.get("").await?;
        debug!(did = %account.did(), version = ?info.version, "Connected to storage node");
        Ok(info)
    }

    /// Open the named context belonging to `account`.
    ///
    /// A context the node does not know is reported as `NotFound` with an
    /// "Unable to locate" message.
    pub async fn open_context(&self, account: &Account, name: &str) -> Result<Context> {
        let database = database_name(&[&account.did().to_lowercase(), name]);
        match self.get::<DbInfo>(&database).await {
            Ok(_) => {
                debug!(did = %account.did(), context = %name, database = %database, "Opened context");
                Ok(Context::new(
                    self.clone(),
                    name.to_string(),
                    account.did().to_string(),
                    database,
                ))
            }
            Err(e) if e.is_not_found() => Err(Error::NotFound(format!(
                "Unable to locate context '{}' for {}",
                name,
                account.did()
            ))),
            Err(e) => Err(e),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for a node path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner.endpoint.join(path).map_err(Error::from)
    }

    /// Make a GET request.
    pub(crate) async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Make a POST request.
    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = self.url(path)?;
        let response = self
            .inner
            .http
            .post(url)
            .json(body)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();

        match response.json::<ErrorResponse>().await {
            Ok(err) => {
                let detail = if err.reason.is_empty() {
                    err.error.clone()
                } else {
                    err.reason.clone()
                };
                match status {
                    404 => Error::NotFound(detail),
                    401 | 403 => Error::Auth(detail),
                    _ => Error::Api {
                        status,
                        error: err.error,
                        reason: err.reason,
                    },
                }
            }
            Err(_) => Error::Api {
                status,
                error: "unknown".to_string(),
                reason: format!("HTTP {status}"),
            },
        }
    }
}

impl std::fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkClient")
            .field("network", &self.inner.network)
            .field("endpoint", &self.inner.endpoint.as_str())
            .finish()
    }
}

/// Database name for a sequence of scoping parts.
///
/// Node database names must start with a letter and use a restricted
/// alphabet, so the parts are hashed.
pub(crate) fn database_name(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"/");
    }
    let digest = hex::encode(hasher.finalize());
    format!("v{}", &digest[..40])
}

/// Builder for a [`NetworkClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    endpoint: Option<String>,
    network: Network,
    auth_token: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            network: Network::default(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the storage endpoint.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Set the network.
    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set a bearer token sent with every request.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<NetworkClient> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::Config("endpoint is required".to_string()))?;

        let mut endpoint = Url::parse(&endpoint)?;
        if !endpoint.path().ends_with('/') {
            endpoint.set_path(&format!("{}/", endpoint.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::Config("Invalid auth token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("vault-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(NetworkClient {
            inner: Arc::new(ClientInner {
                http,
                endpoint,
                network: self.network,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn client_for(server: &MockServer) -> NetworkClient {
        NetworkClient::builder()
            .network(Network::Banksia)
            .endpoint(server.uri())
            .build()
            .unwrap()
    }

    fn account() -> Account {
        Account::from_private_key(KEY, Network::Banksia).unwrap()
    }

    #[test]
    fn test_builder_requires_endpoint() {
        assert!(ClientBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let client = ClientBuilder::new()
            .endpoint("http://localhost:5984/node")
            .build()
            .unwrap();
        assert_eq!(client.endpoint().as_str(), "http://localhost:5984/node/");
        assert_eq!(
            client.url("/abc/_find").unwrap().as_str(),
            "http://localhost:5984/node/abc/_find"
        );
    }

    #[test]
    fn test_database_names_are_scoped() {
        let a = database_name(&["did:vda:testnet:0xabc", "Vault"]);
        let b = database_name(&["did:vda:testnet:0xabc", "Other"]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 41);
        assert!(a.starts_with('v'));
    }

    #[tokio::test]
    async fn test_connect_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"couchdb": "Welcome", "version": "3.3.3"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = NetworkClient::builder()
            .network(Network::Banksia)
            .endpoint(server.uri())
            .auth_token("secret")
            .build()
            .unwrap();
        let info = client.connect(&account()).await.unwrap();
        assert_eq!(info.version.as_deref(), Some("3.3.3"));
    }

    #[tokio::test]
    async fn test_connect_rejects_other_network() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let other = Account::from_private_key(KEY, Network::Myrtle).unwrap();
        assert!(matches!(
            client.connect(&other).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"error": "internal", "reason": "disk full"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).connect(&account()).await.unwrap_err();
        match err {
            Error::Api { status, reason, .. } => {
                assert_eq!(status, 500);
                assert_eq!(reason, "disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_context_missing_is_unable_to_locate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": "not_found", "reason": "Database does not exist."})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .open_context(&account(), "Verida: Vault")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("Unable to locate"));
    }

    #[tokio::test]
    async fn test_open_context() {
        let server = MockServer::start().await;
        let account = account();
        let database = database_name(&[&account.did().to_lowercase(), "Verida: Vault"]);
        Mock::given(method("GET"))
            .and(path(format!("/{database}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"db_name": database, "doc_count": 0})),
            )
            .mount(&server)
            .await;

        let context = client_for(&server)
            .open_context(&account, "Verida: Vault")
            .await
            .unwrap();
        assert_eq!(context.name(), "Verida: Vault");
        assert_eq!(context.did(), account.did());
        assert_eq!(context.database(), database);
    }
}
