//! Error taxonomy for the chat client.
//!
//! - [`DecodeError`]: one malformed frame. Logged and dropped, never fatal to a stream.
//! - [`TransportError`]: a connection failed to open or a send failed. Returned to the caller.
//! - [`ClientError`]: what `ChatClient` operations return, wrapping the above plus
//!   connection loss and application errors reported by the remote agent.

use thiserror::Error;

/// A single frame could not be turned into a [`ChatEvent`](crate::ChatEvent).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame body is not valid JSON (or has a field of the wrong shape).
    #[error("invalid JSON in frame: {source} (data: {preview})")]
    InvalidJson {
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
        /// Truncated copy of the offending frame data.
        preview: String,
    },

    /// The frame is JSON but not an object.
    #[error("frame payload is not a JSON object")]
    NotAnObject,

    /// Neither the payload nor the framing named an event type.
    #[error("frame has no event type")]
    MissingType,

    /// The event type is not one the client understands.
    #[error("unknown event type: {0}")]
    UnknownType(String),
}

impl DecodeError {
    /// Stable short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson { .. } => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
        }
    }
}

/// A connection could not be opened, or a payload could not be sent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport variant needs an open connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// A previous streamed reply is still in flight.
    #[error("a streamed reply is already in progress")]
    Busy,

    /// The configured endpoint cannot be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The HTTP request failed before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// The socket handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing to an open connection failed.
    #[error("send failed: {0}")]
    Send(String),
}

impl TransportError {
    /// Stable short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Busy => "busy",
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::Request(_) => "request",
            Self::Http { .. } => "http",
            Self::Connect(_) => "connect",
            Self::Send(_) => "send",
        }
    }
}

/// Errors surfaced by client-level operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A frame failed to decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The transport rejected the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The socket closed and every reconnect attempt failed.
    #[error("connection lost after {attempts} reconnect attempts")]
    ConnectionLost {
        /// Reconnect attempts made before giving up.
        attempts: u32,
    },

    /// The remote agent reported an error.
    #[error("agent error: {0}")]
    Application(String),

    /// Nothing to send: no text and no attachments.
    #[error("message is empty")]
    EmptyMessage,
}

impl ClientError {
    /// Stable short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(e) => e.kind(),
            Self::Transport(e) => e.kind(),
            Self::ConnectionLost { .. } => "connection_lost",
            Self::Application(_) => "application",
            Self::EmptyMessage => "empty_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::Http {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503: overloaded");
        assert_eq!(err.kind(), "http");
    }

    #[test]
    fn client_error_wraps_transport_transparently() {
        let err: ClientError = TransportError::NotConnected.into();
        assert_eq!(err.to_string(), "not connected");
        assert_eq!(err.kind(), "not_connected");
    }

    #[test]
    fn connection_lost_mentions_attempts() {
        let err = ClientError::ConnectionLost { attempts: 5 };
        assert!(err.to_string().contains('5'));
        assert_eq!(err.kind(), "connection_lost");
    }

    #[test]
    fn decode_error_kinds() {
        assert_eq!(DecodeError::MissingType.kind(), "missing_type");
        assert_eq!(DecodeError::UnknownType("x".into()).kind(), "unknown_type");
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DecodeError::InvalidJson {
            source: json_err,
            preview: "{".into(),
        };
        assert_eq!(err.kind(), "invalid_json");
        assert!(err.to_string().contains("data: {"));
    }
}
