//! Request handling for the vault MCP surface.
//!
//! Resources list and read the schema registry. The single `query` tool
//! acquires the cached session for the configured credential, runs a
//! selector against one schema's datastore and gives the session back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vault_client::{FindOptions, VaultSession};
use vault_config::ReleaseMode;
use vault_session::{Session, SessionCache, SessionFactory};

use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListResourcesResult, ListToolsResult, MCP_PROTOCOL_VERSION,
    ReadResourceParams, ReadResourceResult, RequestId, ResourceContents, ServerCapabilities,
    ServerInfo, ToolInfo,
};
use crate::registry::{SCHEMA_MIME, SchemaRegistry};

/// Name of the query tool.
pub const QUERY_TOOL: &str = "query";

const INVALID_ENCODING: &str = "Invalid encoding (check permissions header)";

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// Matching records.
    pub items: Vec<Value>,
    /// Data rows in the datastore, excluding index documents.
    pub db_rows: i64,
}

/// A session that can answer read-only queries.
#[async_trait]
pub trait QuerySession: Session {
    /// Run `selector` against the datastore for `schema_url`.
    async fn query(
        &self,
        schema_url: &str,
        selector: &Value,
        options: FindOptions,
    ) -> vault_client::Result<QueryPage>;
}

#[async_trait]
impl QuerySession for VaultSession {
    async fn query(
        &self,
        schema_url: &str,
        selector: &Value,
        options: FindOptions,
    ) -> vault_client::Result<QueryPage> {
        let store = self.context().open_datastore(schema_url)?;
        let items = store.find(selector, options).await?;
        let db_rows = store.row_count().await?;
        Ok(QueryPage { items, db_rows })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryArgs {
    schema_name: Option<String>,
    filter: Option<Value>,
    limit: Option<Number>,
    skip: Option<Number>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    items: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<Number>,
    db_rows: i64,
}

/// Paging value sent to the datastore. Fractions round down; negative
/// values leave the datastore default in place.
fn page_value(value: Option<&Number>) -> Option<u64> {
    let value = value?;
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.floor() as u64)
}

/// Handles MCP requests against a session cache and schema registry.
pub struct VaultHandler<F: SessionFactory> {
    cache: SessionCache<F>,
    credential: String,
    registry: SchemaRegistry,
    info: ServerInfo,
    release: ReleaseMode,
}

impl<F> VaultHandler<F>
where
    F: SessionFactory,
    F::Session: QuerySession,
{
    /// Create a handler serving queries for `credential`.
    pub fn new(cache: SessionCache<F>, credential: impl Into<String>, registry: SchemaRegistry) -> Self {
        Self {
            cache,
            credential: credential.into(),
            registry,
            info: ServerInfo {
                name: "vault/user-data".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            release: ReleaseMode::default(),
        }
    }

    /// Set the server name and version reported by `initialize`.
    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = ServerInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Set what happens to a session when a query finishes.
    pub fn with_release_mode(mut self, release: ReleaseMode) -> Self {
        self.release = release;
        self
    }

    /// The session cache.
    pub fn cache(&self) -> &SessionCache<F> {
        &self.cache
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    /// Handle one raw message. Returns the response to send, if any.
    pub async fn handle_message(&self, text: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };

        let id = value
            .get("id")
            .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok());

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(
                        JsonRpcError::INVALID_REQUEST,
                        format!("Invalid Request: {e}"),
                    ),
                ));
            }
        };

        self.handle(request).await
    }

    /// Handle a parsed request. Notifications produce no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != crate::protocol::JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                request.id,
                JsonRpcError::new(
                    JsonRpcError::INVALID_REQUEST,
                    format!("Unsupported jsonrpc version: {}", request.jsonrpc),
                ),
            ));
        }

        let Some(id) = request.id else {
            debug!(method = %request.method, "Received notification");
            return None;
        };

        debug!(id = %id, method = %request.method, "Handling request");
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => Some(JsonRpcResponse::success(Some(id), result)),
            Err(e) => {
                warn!(id = %id, method = %request.method, error = %e, "Request failed");
                Some(JsonRpcResponse::failure(Some(id), e.into()))
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            "initialize" => {
                let params: InitializeParams = parse_params(params)?;
                Ok(serde_json::to_value(self.initialize(params))?)
            }
            "ping" => Ok(json!({})),
            "resources/list" => Ok(serde_json::to_value(self.list_resources())?),
            "resources/read" => {
                let params: ReadResourceParams = require_params(params)?;
                Ok(serde_json::to_value(self.read_resource(params).await?)?)
            }
            "tools/list" => Ok(serde_json::to_value(self.list_tools())?),
            "tools/call" => {
                let params: CallToolParams = require_params(params)?;
                Ok(serde_json::to_value(self.call_tool(params).await?)?)
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Answer the handshake.
    pub fn initialize(&self, params: InitializeParams) -> InitializeResult {
        info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol = %params.protocol_version,
            "Client initialized"
        );
        InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(json!({})),
                resources: Some(json!({})),
            },
            server_info: self.info.clone(),
        }
    }

    /// List one schema resource per registered schema.
    pub fn list_resources(&self) -> ListResourcesResult {
        ListResourcesResult {
            resources: self.registry.resources(),
        }
    }

    /// Fetch the schema document behind a resource URI.
    pub async fn read_resource(&self, params: ReadResourceParams) -> Result<ReadResourceResult> {
        let name = SchemaRegistry::parse_uri(&params.uri)?;
        let schema = self.registry.fetch(&name).await?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: Some(SCHEMA_MIME.to_string()),
                text: serde_json::to_string(&schema)?,
            }],
        })
    }

    /// List the available tools.
    pub fn list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: vec![ToolInfo {
                name: QUERY_TOOL.to_string(),
                description: Some("Run a read-only CouchDB query using a known schema".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "schemaName": { "type": "string" },
                        "filter": { "type": "object" },
                        "limit": {
                            "type": "number",
                            "description": "Maximum number of records; negative means no limit"
                        },
                        "skip": {
                            "type": "number",
                            "description": "Number of records to skip; negative means none"
                        }
                    }
                }),
            }],
        }
    }

    /// Invoke a tool.
    pub async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult> {
        if params.name != QUERY_TOOL {
            return Err(McpError::UnknownTool(params.name));
        }

        let args: QueryArgs = match params.arguments {
            None | Some(Value::Null) => QueryArgs::default(),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| McpError::invalid_params(format!("query arguments: {e}")))?,
        };
        if let Some(filter) = &args.filter
            && !(filter.is_object() || filter.is_null())
        {
            return Err(McpError::invalid_params("filter must be an object"));
        }

        let schema_name = args.schema_name.clone().unwrap_or_default();
        match self.run_query(&args, &schema_name).await {
            Ok(result) => Ok(CallToolResult::text(serde_json::to_string_pretty(&result)?)),
            Err(message) => {
                let message = if message.contains("invalid encoding") {
                    INVALID_ENCODING.to_string()
                } else {
                    message
                };
                Err(McpError::tool_error(format!(
                    "Tool error: {QUERY_TOOL} {message} {schema_name}"
                )))
            }
        }
    }

    async fn run_query(&self, args: &QueryArgs, schema_name: &str) -> std::result::Result<QueryResult, String> {
        let schema_url = self
            .registry
            .get(schema_name)
            .ok_or_else(|| format!("Unknown schema: {schema_name}"))?;

        let caller = Uuid::new_v4().to_string();
        let session = self
            .cache
            .acquire(&self.credential, caller.as_str())
            .await
            .map_err(|e| e.to_string())?;

        let selector = args.filter.clone().unwrap_or_else(|| json!({}));
        let options = FindOptions {
            limit: page_value(args.limit.as_ref()),
            skip: page_value(args.skip.as_ref()),
        };
        let outcome = session.query(schema_url, &selector, options).await;
        self.give_back(session.identity(), &caller).await;

        let page = outcome.map_err(|e| e.to_string())?;
        debug!(
            schema = %schema_name,
            items = page.items.len(),
            db_rows = page.db_rows,
            "Query complete"
        );
        Ok(QueryResult {
            items: page.items,
            limit: args.limit.clone(),
            skip: args.skip.clone(),
            db_rows: page.db_rows,
        })
    }

    async fn give_back(&self, identity: &str, caller: &str) {
        match self.release {
            ReleaseMode::Detach => {
                self.cache.detach(identity, caller);
            }
            ReleaseMode::Eager => self.cache.release(identity, caller).await,
        }
    }

    /// Close every cached session.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }
}

fn parse_params<T: serde::de::DeserializeOwned + Default>(params: Option<Value>) -> Result<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v).map_err(|e| McpError::invalid_params(e.to_string())),
    }
}

fn require_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|e| McpError::invalid_params(e.to_string()))
}
