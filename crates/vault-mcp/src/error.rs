//! Error types for MCP operations.

use thiserror::Error;

use crate::protocol::JsonRpcError;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to communicate with the peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed framing or message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The method is not part of the protocol surface.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Request parameters are missing or malformed.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Resource URI could not be resolved.
    #[error("{0}")]
    InvalidResource(String),

    /// Fetching a schema document failed.
    #[error("{0}")]
    Schema(String),

    /// No tool with this name.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool execution failed.
    #[error("{0}")]
    ToolError(String),
}

impl McpError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid params error.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Create a tool error.
    pub fn tool_error(msg: impl Into<String>) -> Self {
        Self::ToolError(msg.into())
    }

    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i64 {
        match self {
            McpError::Json(_) | McpError::Protocol(_) => JsonRpcError::INVALID_REQUEST,
            McpError::MethodNotFound(_) => JsonRpcError::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::UnknownTool(_) => JsonRpcError::INVALID_PARAMS,
            McpError::InvalidResource(_)
            | McpError::Schema(_)
            | McpError::ToolError(_)
            | McpError::Transport(_)
            | McpError::Io(_) => JsonRpcError::INTERNAL_ERROR,
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(e: McpError) -> Self {
        JsonRpcError::new(e.code(), e.to_string())
    }
}
