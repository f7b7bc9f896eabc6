// src/core/protocol/line_codec.rs

//! Implements the newline-delimited framing used by the legacy backend and
//! the corresponding `Encoder` and `Decoder` for network communication.
//!
//! The backend speaks plain text: one JSON object per line, in both
//! directions. The decoder accumulates raw bytes and hands back complete,
//! whitespace-trimmed lines; empty lines are discarded silently.

use crate::core::commands::Command;
use crate::core::errors::BridgeError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// The terminator separating messages on the wire.
const LINE_TERMINATOR: u8 = b'\n';

/// A `tokio_util::codec` implementation for the backend's line protocol.
///
/// The internal read buffer is bounded: if it grows past `max_buffer_size`
/// without a terminator in sight, the entire buffer is discarded and framing
/// resumes from empty. This is a documented lossy-overflow policy of the
/// bridge, logged but never surfaced as an error to any caller.
#[derive(Debug)]
pub struct LineCodec {
    max_buffer_size: usize,
}

impl LineCodec {
    /// Creates a codec whose receive buffer is capped at `max_buffer_size` bytes.
    pub fn new(max_buffer_size: usize) -> Self {
        Self { max_buffer_size }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = BridgeError;

    /// Extracts the next complete line from the buffer, trimming surrounding
    /// whitespace (including the `\r` of CRLF-terminated backends). Loops past
    /// empty lines so callers only ever see messages with content.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == LINE_TERMINATOR) else {
                if src.len() > self.max_buffer_size {
                    warn!(
                        "Receive buffer exceeded {} bytes without a line terminator; discarding {} buffered bytes.",
                        self.max_buffer_size,
                        src.len()
                    );
                    src.clear();
                }
                return Ok(None);
            };

            let raw = src.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }
}

impl Encoder<Command> for LineCodec {
    type Error = BridgeError;

    /// Encodes a command as exactly one terminated line.
    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        dst.reserve(payload.len() + 1);
        dst.extend_from_slice(&payload);
        dst.put_u8(LINE_TERMINATOR);
        Ok(())
    }
}
