//! Schema registry and schema resource URIs.
//!
//! Every registered schema is exposed as a resource at
//! `verida://datastore/<NAME>/schema`. Reading the resource fetches the
//! schema document from its published URL.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::{McpError, Result};
use crate::protocol::ResourceInfo;

/// Base of every schema resource URI.
pub const RESOURCE_BASE: &str = "verida://datastore/";

/// Final path segment of a schema resource.
pub const SCHEMA_SEGMENT: &str = "schema";

/// MIME type of schema resources.
pub const SCHEMA_MIME: &str = "application/json";

/// Maps schema names to schema document URLs.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, String>,
    http: reqwest::Client,
    timeout: Duration,
}

impl SchemaRegistry {
    /// Create a registry over `schemas`.
    pub fn new(schemas: BTreeMap<String, String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("vault-mcp/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            schemas,
            http,
            timeout: Duration::from_secs(30),
        })
    }

    /// Set the timeout used when fetching schema documents.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Schema URL registered under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.schemas.get(name).map(String::as_str)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Resource URI for a schema name.
    pub fn resource_uri(name: &str) -> String {
        format!("{RESOURCE_BASE}{name}/{SCHEMA_SEGMENT}")
    }

    /// One resource per registered schema.
    pub fn resources(&self) -> Vec<ResourceInfo> {
        self.names()
            .map(|name| ResourceInfo {
                uri: Self::resource_uri(name),
                name: format!("\"{name}\" database schema"),
                mime_type: Some(SCHEMA_MIME.to_string()),
            })
            .collect()
    }

    /// Extract the schema name from a resource URI.
    pub fn parse_uri(uri: &str) -> Result<String> {
        let url = Url::parse(uri)
            .map_err(|e| McpError::InvalidResource(format!("Invalid resource URI: {uri} ({e})")))?;

        let mut segments: Vec<&str> = url.path().split('/').collect();
        let resource_type = segments.pop().unwrap_or_default();
        let schema_name = segments.pop().unwrap_or_default();
        if resource_type != SCHEMA_SEGMENT {
            return Err(McpError::InvalidResource(format!(
                "Invalid resource URI: {schema_name} {resource_type}"
            )));
        }
        Ok(schema_name.to_string())
    }

    /// Fetch the schema document registered under `name`.
    pub async fn fetch(&self, name: &str) -> Result<Value> {
        let url = self
            .get(name)
            .ok_or_else(|| McpError::InvalidResource(format!("Unknown schema: {name}")))?;

        tracing::debug!(schema = %name, url = %url, "Fetching schema document");
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| McpError::Schema(format!("Failed to fetch schema {name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Schema(format!(
                "Failed to fetch schema {name}: HTTP {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| McpError::Schema(format!("Schema {name} is not valid JSON: {e}")))
    }
}
