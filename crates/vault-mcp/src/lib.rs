//! MCP (Model Context Protocol) server for vault data.
//!
//! Exposes the schema registry as resources and a read-only `query` tool
//! over stdio, backed by a per-identity session cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpServer                                                  │
//! │  - Reads framed JSON-RPC from stdin, writes to stdout       │
//! │  - Dispatches requests concurrently                         │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  VaultHandler                                               │
//! │  - initialize, ping, resources/*, tools/*                   │
//! │  - SchemaRegistry for resources                             │
//! │  - SessionCache<F> for queries                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use vault_mcp::{McpServer, SchemaRegistry, VaultHandler};
//!
//! let registry = SchemaRegistry::new(config.schema_registry())?;
//! let handler = VaultHandler::new(cache, private_key, registry)
//!     .with_release_mode(ReleaseMode::Detach);
//! McpServer::new(handler).serve_stdio().await?;
//! ```

pub mod error;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

pub use error::{McpError, Result};
pub use handler::{QUERY_TOOL, QueryPage, QuerySession, VaultHandler};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListResourcesResult, ListToolsResult, ReadResourceParams,
    ReadResourceResult, RequestId, ResourceContents, ResourceInfo, ServerCapabilities, ServerInfo,
    ToolContent, ToolInfo,
};
pub use registry::SchemaRegistry;
pub use server::McpServer;
pub use transport::{Framing, MessageReader, MessageWriter};
