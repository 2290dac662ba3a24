//! # SSE frame decoder
//!
//! Incremental Server-Sent Events framing for streamed replies:
//! - Line buffering across arbitrary chunk boundaries
//! - `event:` / `data:` fields, frames terminated by a blank line
//! - Multiple `data:` lines joined with `\n`
//! - `:` comments, `[DONE]` markers, and empty frames skipped
//!
//! The decoder only splits frames. Turning frame data into events is
//! [`parley_core::events::decode_event`]'s job.

use bytes::BytesMut;
use tracing::{trace, warn};

/// Event type of a frame without an `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// One complete SSE frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the frame's `event:` line, if any.
    pub event: Option<String>,
    /// Frame data (multiple `data:` lines joined with `\n`).
    pub data: String,
}

impl SseFrame {
    /// The frame's `event:` value, or [`DEFAULT_EVENT`].
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT)
    }
}

/// Stateful SSE decoder. Feed it chunks with [`push`](Self::push).
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            event: None,
            data: Vec::new(),
        }
    }

    /// Append a chunk and return every frame it completed.
    ///
    /// Incomplete lines and frames stay buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes = self.buffer.split_to(newline_pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            let Ok(line) = std::str::from_utf8(&line_bytes) else {
                warn!(len = line_bytes.len(), "skipping non-UTF-8 SSE line");
                continue;
            };
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// End of stream: flush a trailing frame that lacked its blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            match std::str::from_utf8(&rest) {
                Ok(line) => {
                    let _ = self.process_line(line.trim_end_matches('\r'));
                }
                Err(_) => warn!(len = rest.len(), "discarding non-UTF-8 SSE tail"),
            }
        }
        self.dispatch()
    }

    /// Bytes held back waiting for a newline.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                let value = value.trim();
                self.event = (!value.is_empty()).then(|| value.to_owned());
            }
            "data" => self.data.push(value.to_owned()),
            _ => trace!(field, "ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        let trimmed = data.trim();
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return None;
        }
        Some(SseFrame { event, data })
    }
}
