//! The transport contract shared by the SSE and socket variants.

use async_trait::async_trait;
use parley_core::{ThreadId, TransportError};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::lifecycle::Generation;
use crate::subscribers::{Handler, SubscriptionId};

/// How a transport talks to the agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMode {
    /// Each `send` opens a streamed HTTP reply.
    Stream,
    /// One persistent socket carries frames both ways.
    Socket,
}

/// Body of a chat request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Message text.
    pub message: String,
    /// Conversation thread.
    pub thread_id: ThreadId,
    /// Originating actor.
    pub source: String,
    /// Free-form metadata; attachments go under `files`.
    pub metadata: Map<String, Value>,
}

impl ChatRequest {
    /// Request with empty metadata.
    pub fn new(message: impl Into<String>, thread_id: ThreadId, source: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            thread_id,
            source: source.into(),
            metadata: Map::new(),
        }
    }

    /// Attach already-uploaded file URLs as `metadata.files`.
    #[must_use]
    pub fn with_files(mut self, files: &[String]) -> Self {
        if !files.is_empty() {
            let urls = files.iter().cloned().map(Value::String).collect();
            let _ = self.metadata.insert("files".to_owned(), Value::Array(urls));
        }
        self
    }
}

/// A stream transport.
///
/// Subscribers registered with [`on`](Self::on) receive events synchronously,
/// in arrival order, from the transport's single reader task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which variant this is.
    fn mode(&self) -> TransportMode;

    /// Open the connection. Calling while already open is a no-op.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Send a chat request.
    async fn send(&self, request: &ChatRequest) -> Result<(), TransportError>;

    /// Close the connection and cancel pending reconnects. Idempotent.
    fn disconnect(&self);

    /// Subscribe to events with `key` (or `"*"` for all).
    fn on(&self, key: &str, handler: Handler) -> SubscriptionId;

    /// Unsubscribe.
    fn off(&self, id: SubscriptionId) -> bool;

    /// Whether a connection is currently open.
    fn is_connected(&self) -> bool;

    /// Generation of the current (or most recent) connection.
    fn generation(&self) -> Generation;

    /// Whether a previous reply still holds the transport, so `send` would
    /// fail with `Busy`.
    fn is_busy(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let request = ChatRequest::new("hello", ThreadId::from("default_session"), "user")
            .with_files(&["https://f/a.png".to_owned()]);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "message": "hello",
                "thread_id": "default_session",
                "source": "user",
                "metadata": {"files": ["https://f/a.png"]}
            })
        );
    }

    #[test]
    fn no_files_leaves_metadata_empty() {
        let request = ChatRequest::new("hi", ThreadId::from("t"), "api").with_files(&[]);
        assert!(request.metadata.is_empty());
    }
}
