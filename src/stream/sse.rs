//! Server-Sent Events plumbing: byte-to-line splitting for the backend
//! stream, `data:` payload framing, and chunk encoding for the client.
use memchr::memchr_iter;
use serde::Serialize;

use crate::error::GatewayError;

pub const DONE_PAYLOAD: &str = "[DONE]";
const DONE_FRAME: &str = "data: [DONE]\n\n";
const DATA_FIELD: &str = "data:";

// ---------------------------------------------------------------------------
// LineSplitter: raw bytes to lines
// ---------------------------------------------------------------------------

/// Splits an arbitrarily chunked byte stream into lines.
///
/// Lines end at `\n`; a trailing `\r` is stripped. UTF-8 sequences split
/// across chunk boundaries are carried over to the next chunk.
#[derive(Debug, Default)]
pub struct LineSplitter {
    text: String,
    read_offset: usize,
    partial_utf8: Vec<u8>,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and append every completed line to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        if self.partial_utf8.is_empty() {
            let consumed = Self::decode_into(&mut self.text, chunk);
            self.partial_utf8.extend_from_slice(&chunk[consumed..]);
        } else {
            let mut pending = std::mem::take(&mut self.partial_utf8);
            pending.extend_from_slice(chunk);
            let consumed = Self::decode_into(&mut self.text, &pending);
            pending.drain(..consumed);
            self.partial_utf8 = pending;
        }
        self.drain_lines(out);
    }

    /// Flush whatever is left once the stream ends. Returns the final
    /// unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial_utf8.is_empty() {
            let tail = std::mem::take(&mut self.partial_utf8);
            self.text.push_str(&String::from_utf8_lossy(&tail));
        }
        let rest = &self.text[self.read_offset..];
        let line = rest.strip_suffix('\r').unwrap_or(rest).to_string();
        self.text.clear();
        self.read_offset = 0;
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }

    /// Append the decodable prefix of `bytes` to `text`, returning how many
    /// bytes were consumed. Only an incomplete trailing sequence is held
    /// back; invalid bytes become U+FFFD.
    fn decode_into(text: &mut String, bytes: &[u8]) -> usize {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                text.push_str(valid);
                bytes.len()
            }
            Err(err) if err.error_len().is_none() => {
                let valid_up_to = err.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&bytes[..valid_up_to]));
                valid_up_to
            }
            Err(_) => {
                text.push_str(&String::from_utf8_lossy(bytes));
                bytes.len()
            }
        }
    }

    fn drain_lines(&mut self, out: &mut Vec<String>) {
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &self.text.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.text[processed_up_to..line_end];
            out.push(line.strip_suffix('\r').unwrap_or(line).to_string());
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.text.len() {
            self.text.clear();
            self.read_offset = 0;
        } else if self.read_offset >= 8 * 1024 || self.read_offset >= self.text.len() / 2 {
            self.text.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// SseLineFramer: lines to event payloads
// ---------------------------------------------------------------------------

/// Accumulates `data:` lines and releases the joined payload when a blank
/// line ends the event. Other fields (`event:`, `id:`, comments) are
/// ignored.
#[derive(Debug, Default)]
pub struct SseLineFramer {
    data: String,
}

impl SseLineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator).
    ///
    /// Returns the complete payload when `line` is blank and at least one
    /// `data:` line was buffered; blank lines with nothing buffered are no-ops.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data));
        }
        if let Some(value) = line.strip_prefix(DATA_FIELD) {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Frame a compact JSON string as a single `data:` event.
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 8);
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// Serialize `value` compactly and frame it.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] when `value` cannot be serialized.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, GatewayError> {
    let json = serde_json::to_string(value)
        .map_err(|err| GatewayError::Internal(format!("failed to encode SSE chunk: {err}")))?;
    Ok(openai_sse_frame(&json))
}

/// The terminal sentinel event.
#[must_use]
pub fn done_frame() -> String {
    DONE_FRAME.to_owned()
}
