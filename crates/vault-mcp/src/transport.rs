//! Stdio framing for MCP messages.
//!
//! Two framings are accepted on input:
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"ping"}\n
//!
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":1,"method":"ping"}
//! ```
//!
//! Replies are written in the framing of the message they answer.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{McpError, Result};

/// Upper bound on a single framed message.
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// How a message was framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line.
    Line,
    /// `Content-Length` header block followed by the body.
    ContentLength,
}

/// Reads framed messages from a byte stream.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Read the next message. Returns `None` at end of input.
    ///
    /// Oversized or non-UTF-8 input is reported as [`McpError::Protocol`]
    /// after the offending line has been consumed, so the caller can keep
    /// reading.
    pub async fn read_message(&mut self) -> Result<Option<(String, Framing)>> {
        loop {
            let Some(line) = self.next_line().await? else {
                return Ok(None);
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                tracing::trace!(json = %trimmed, "received line message");
                return Ok(Some((trimmed.to_string(), Framing::Line)));
            }

            let body = self.read_framed(trimmed).await?;
            return Ok(Some((body, Framing::ContentLength)));
        }
    }

    /// Read the rest of a header block starting with `first`, then the body.
    async fn read_framed(&mut self, first: &str) -> Result<String> {
        let mut content_length = parse_content_length(first)?;

        loop {
            let Some(line) = self.next_line().await? else {
                return Err(McpError::protocol("end of input inside header block"));
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some(len) = parse_content_length(trimmed)? {
                content_length = Some(len);
            }
        }

        let content_length =
            content_length.ok_or_else(|| McpError::protocol("missing Content-Length header"))?;
        if content_length > MAX_MESSAGE_LEN {
            return Err(McpError::protocol(format!(
                "message of {content_length} bytes exceeds limit"
            )));
        }

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await?;
        let body = String::from_utf8(body)
            .map_err(|e| McpError::protocol(format!("invalid UTF-8 in message: {e}")))?;

        tracing::trace!(content_length, json = %body, "received framed message");
        Ok(body)
    }

    /// Read one line of at most [`MAX_MESSAGE_LEN`] bytes.
    async fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = (&mut self.reader)
            .take(MAX_MESSAGE_LEN as u64 + 1)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        if self.buf.len() > MAX_MESSAGE_LEN && !self.buf.ends_with(b"\n") {
            self.buf.clear();
            self.skip_line().await?;
            return Err(McpError::protocol(format!(
                "line exceeds limit of {MAX_MESSAGE_LEN} bytes"
            )));
        }

        String::from_utf8(std::mem::take(&mut self.buf))
            .map(Some)
            .map_err(|e| McpError::protocol(format!("invalid UTF-8 in message: {e}")))
    }

    /// Discard input up to and including the next newline.
    async fn skip_line(&mut self) -> Result<()> {
        loop {
            let (found, used) = {
                let chunk = self.reader.fill_buf().await?;
                if chunk.is_empty() {
                    return Ok(());
                }
                match chunk.iter().position(|b| *b == b'\n') {
                    Some(pos) => (true, pos + 1),
                    None => (false, chunk.len()),
                }
            };
            self.reader.consume(used);
            if found {
                return Ok(());
            }
        }
    }
}

/// Parse a `Content-Length` header line. Other headers yield `None`.
fn parse_content_length(line: &str) -> Result<Option<usize>> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(McpError::protocol(format!("unexpected input: {line}")));
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e| McpError::protocol(format!("invalid Content-Length: {e}")))
}

/// Writes framed messages to a byte stream.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one message and flush.
    pub async fn write_message(&mut self, json: &str, framing: Framing) -> Result<()> {
        match framing {
            Framing::Line => {
                self.writer.write_all(json.as_bytes()).await?;
                self.writer.write_all(b"\n").await?;
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", json.len());
                self.writer.write_all(header.as_bytes()).await?;
                self.writer.write_all(json.as_bytes()).await?;
            }
        }
        self.writer.flush().await?;
        tracing::trace!(?framing, json = %json, "sent message");
        Ok(())
    }
}
