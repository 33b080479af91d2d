//! Stdio server loop.
//!
//! Requests are dispatched concurrently; responses are serialized through a
//! single writer so frames never interleave. When input ends the server
//! waits for outstanding requests and then shuts the session cache down.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use vault_session::SessionFactory;

use crate::error::{McpError, Result};
use crate::handler::{QuerySession, VaultHandler};
use crate::protocol::{JsonRpcError, JsonRpcResponse};
use crate::transport::{Framing, MessageReader, MessageWriter};

/// MCP server over a byte stream pair.
pub struct McpServer<F: SessionFactory> {
    handler: Arc<VaultHandler<F>>,
}

impl<F> McpServer<F>
where
    F: SessionFactory,
    F::Session: QuerySession,
{
    /// Create a server around a handler.
    pub fn new(handler: VaultHandler<F>) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// The request handler.
    pub fn handler(&self) -> &VaultHandler<F> {
        &self.handler
    }

    /// Serve on the process's stdin and stdout.
    pub async fn serve_stdio(self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `reader` reaches end of input.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = MessageReader::new(reader);
        let writer = Arc::new(Mutex::new(MessageWriter::new(writer)));
        let mut tasks = JoinSet::new();

        info!("MCP server listening");
        let outcome = loop {
            let (text, framing) = match reader.read_message().await {
                Ok(Some(message)) => message,
                Ok(None) => break Ok(()),
                Err(McpError::Protocol(msg)) => {
                    warn!(error = %msg, "Dropping malformed message");
                    let response = JsonRpcResponse::failure(
                        None,
                        JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("Parse error: {msg}")),
                    );
                    if let Err(e) = send(&writer, &response, Framing::Line).await {
                        break Err(e);
                    }
                    continue;
                }
                Err(e) => break Err(e),
            };

            let handler = self.handler.clone();
            let writer = writer.clone();
            tasks.spawn(async move {
                if let Some(response) = handler.handle_message(&text).await
                    && let Err(e) = send(&writer, &response, framing).await
                {
                    warn!(error = %e, "Failed to write response");
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "Request task failed");
                }
            }
        };

        debug!(pending = tasks.len(), "Input closed, draining requests");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Request task failed");
            }
        }

        self.handler.shutdown().await;
        info!("MCP server stopped");
        outcome
    }
}

async fn send<W: tokio::io::AsyncWrite + Unpin>(
    writer: &Mutex<MessageWriter<W>>,
    response: &JsonRpcResponse,
    framing: Framing,
) -> Result<()> {
    let json = serde_json::to_string(response)?;
    writer.lock().await.write_message(&json, framing).await
}
