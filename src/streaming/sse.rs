use crate::config::MAX_SSE_BUFFER;
use crate::error::{GatewayError, Result};
use bytes::BytesMut;
use serde_json::Value;

/// Incremental parser recovering JSON events from an SSE byte stream.
///
/// Events are separated by a blank line; the payload is the concatenation
/// of the block's `data: ` line suffixes. Malformed JSON yields no event.
/// The internal buffer is bounded: exceeding [`MAX_SSE_BUFFER`] is a hard
/// error that terminates the connection.
pub struct SseParser {
    buffer: BytesMut,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Feed a chunk of bytes and return the events from all blocks it
    /// completes. The trailing incomplete block stays buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>> {
        if self.buffer.len() + chunk.len() > MAX_SSE_BUFFER {
            return Err(GatewayError::StreamOverflow);
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = find_block_end(&self.buffer) {
            let block = self.buffer.split_to(pos + 2);
            if let Some(event) = parse_block(&block[..pos]) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Parse whatever remains as a final block (no trailing blank line
    /// required) and clear the buffer.
    pub fn flush(&mut self) -> Vec<Value> {
        let rest = self.buffer.split();
        parse_block(&rest).into_iter().collect()
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire-format a single SSE frame: `event: <name>\ndata: <json>\n\n`.
pub fn frame(event: &str, data: &Value) -> String {
    format!("event: {}\ndata: {}\n\n", event, data)
}

fn find_block_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn parse_block(block: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(block);

    let mut payload = String::new();
    let mut has_data = false;
    for line in text.lines() {
        // Only `data: ` lines carry payload; `event:`, `id:`, and comment
        // lines are framing.
        if let Some(suffix) = line.strip_prefix("data: ") {
            if has_data {
                payload.push('\n');
            }
            payload.push_str(suffix);
            has_data = true;
        }
    }

    if !has_data {
        return None;
    }
    serde_json::from_str(&payload).ok()
}
