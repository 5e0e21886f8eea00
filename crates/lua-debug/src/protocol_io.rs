//! Wire envelope framing.
//! - PacketBuffer: accumulate chunks, split `POST <endpoint> HTTP/1.1` packets
//! - encode_packet: build one outbound packet
//! - MessageReader/MessageWriter: async JSON message IO over a byte stream

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DebugError, Result};

const CONTENT_LENGTH: &str = "Content-Length";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 4096;

/// Largest accepted packet body.
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Default request path of the envelope.
pub const DEFAULT_ENDPOINT: &str = "/dap";

/// Inbound byte buffer that yields complete packet bodies.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    inbound: Vec<u8>,
}

impl PacketBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.inbound.extend_from_slice(chunk);
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }

    /// Pops the next complete packet body, or `None` until enough bytes arrived.
    pub fn next_packet(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(header_end) = find(&self.inbound, HEADER_TERMINATOR) else {
            return Ok(None);
        };
        let body_start = header_end + HEADER_TERMINATOR.len();
        let length = match content_length(&self.inbound[..header_end]) {
            Ok(length) => length,
            Err(err) => {
                self.inbound.drain(..body_start);
                return Err(err);
            }
        };
        let packet_end = match body_start.checked_add(length) {
            Some(end) if length <= MAX_PACKET_SIZE => end,
            _ => {
                self.inbound.drain(..body_start);
                return Err(DebugError::Framing(format!(
                    "Content-Length {length} exceeds {MAX_PACKET_SIZE} bytes"
                )));
            }
        };
        if self.inbound.len() < packet_end {
            return Ok(None);
        }
        let body = self.inbound[body_start..packet_end].to_vec();
        self.inbound.drain(..packet_end);
        Ok(Some(body))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn content_length(header: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| DebugError::Framing("header is not utf-8".into()))?;
    for line in text.split("\r\n") {
        // The request line has no `name: value` shape and is skipped here.
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            return value
                .trim()
                .parse::<usize>()
                .map_err(|_| DebugError::Framing(format!("invalid Content-Length '{}'", value.trim())));
        }
    }
    Err(DebugError::Framing("missing Content-Length header".into()))
}

/// Wraps `body` in the envelope.
#[must_use]
pub fn encode_packet(endpoint: &str, body: &[u8]) -> Vec<u8> {
    let length = body.len();
    let mut packet = format!(
        "POST {endpoint} HTTP/1.1\r\nContent-Type: application/json\r\n{CONTENT_LENGTH}: {length}\r\n\r\n"
    )
    .into_bytes();
    packet.extend_from_slice(body);
    packet
}

/// Reads framed JSON messages from an async byte stream.
pub struct MessageReader<R> {
    reader: R,
    buffer: PacketBuffer,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: PacketBuffer::new(),
        }
    }

    /// Next raw packet body; `None` once the stream ends.
    pub async fn read_packet(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(packet) = self.buffer.next_packet()? {
                return Ok(Some(packet));
            }
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                if self.buffer.buffered() > 0 {
                    tracing::debug!(
                        bytes = self.buffer.buffered(),
                        "stream ended inside a packet"
                    );
                }
                return Ok(None);
            }
            self.buffer.extend(&chunk[..read]);
        }
    }

    /// Next JSON message. Packets that are not valid JSON are logged and skipped.
    pub async fn read_message(&mut self) -> Result<Option<Value>> {
        loop {
            let Some(packet) = self.read_packet().await? else {
                return Ok(None);
            };
            match serde_json::from_slice::<Value>(&packet) {
                Ok(value) => {
                    tracing::trace!(payload = %value, "<-");
                    return Ok(Some(value));
                }
                Err(err) => {
                    tracing::warn!(%err, "dropping packet with invalid json");
                }
            }
        }
    }
}

/// Writes framed JSON messages to an async byte stream.
pub struct MessageWriter<W> {
    writer: W,
    endpoint: String,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W, endpoint: impl Into<String>) -> Self {
        Self {
            writer,
            endpoint: endpoint.into(),
        }
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        tracing::trace!(payload = %String::from_utf8_lossy(&payload), "->");
        let packet = encode_packet(&self.endpoint, &payload);
        self.writer.write_all(&packet).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
