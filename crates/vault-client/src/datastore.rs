//! Read-only queries against one schema's datastore.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::client::NetworkClient;
use crate::error::{Error, Result};

/// Database metadata returned by `GET /{db}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbInfo {
    /// Database name.
    #[serde(default)]
    pub db_name: String,
    /// Number of documents, including design documents.
    #[serde(default)]
    pub doc_count: u64,
    /// Number of deleted documents.
    #[serde(default)]
    pub doc_del_count: u64,
}

/// Index listing returned by `GET /{db}/_index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexList {
    /// Number of indexes, including the built-in `_id` index.
    #[serde(default)]
    pub total_rows: u64,
    /// Index definitions.
    #[serde(default)]
    pub indexes: Vec<Value>,
}

/// Paging for [`Datastore::find`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
}

#[derive(Serialize)]
struct FindRequest<'a> {
    selector: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<u64>,
}

#[derive(Deserialize)]
struct FindResponse {
    #[serde(default)]
    docs: Vec<Value>,
    #[serde(default)]
    warning: Option<String>,
}

/// Records of one schema inside a context.
pub struct Datastore {
    client: NetworkClient,
    schema_url: String,
    database: String,
    closed: Arc<AtomicBool>,
}

impl Datastore {
    pub(crate) fn new(
        client: NetworkClient,
        schema_url: String,
        database: String,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            schema_url,
            database,
            closed,
        }
    }

    /// Schema the records follow.
    pub fn schema_url(&self) -> &str {
        &self.schema_url
    }

    /// Backing database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run a selector query. A `null` selector matches everything.
    pub async fn find(&self, selector: &Value, options: FindOptions) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let empty = Value::Object(Map::new());
        let selector = if selector.is_null() { &empty } else { selector };
        let request = FindRequest {
            selector,
            limit: options.limit,
            skip: options.skip,
        };
        let response: FindResponse = self
            .client
            .post(&format!("{}/_find", self.database), &request)
            .await?;
        if let Some(warning) = &response.warning {
            trace!(database = %self.database, %warning, "Query warning");
        }
        Ok(response.docs)
    }

    /// Database metadata.
    pub async fn info(&self) -> Result<DbInfo> {
        self.ensure_open()?;
        self.client.get(&self.database).await
    }

    /// Index listing.
    pub async fn indexes(&self) -> Result<IndexList> {
        self.ensure_open()?;
        self.client.get(&format!("{}/_index", self.database)).await
    }

    /// Number of data rows.
    ///
    /// `total_rows` counts the built-in `_id` index, which holds no row, so one
    /// is added back after subtracting the index documents from `doc_count`.
    pub async fn row_count(&self) -> Result<i64> {
        let info = self.info().await?;
        let indexes = self.indexes().await?;
        Ok(info.doc_count as i64 - indexes.total_rows as i64 + 1)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ContextClosed(self.schema_url.clone()));
        }
        Ok(())
    }
}
