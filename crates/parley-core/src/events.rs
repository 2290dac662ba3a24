//! Wire events and their decoding.
//!
//! Every frame the remote agent sends is one JSON object tagged by `type`.
//! [`decode_event`] validates a frame, resolves the event type, fills in
//! client-side defaults (IDs, timestamps, role, source), and produces a typed
//! [`ChatEvent`]. Control frames such as `pong` decode to `Ok(None)` so the
//! transport can swallow them without surfacing anything.
//!
//! ## Type resolution
//!
//! The payload's own `type` field wins. If it is absent, the framing hint
//! (the SSE `event:` line) is used. Socket frames carry no hint, so a payload
//! without `type` fails with [`DecodeError::MissingType`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::DecodeError;
use crate::ids::{MessageId, ThoughtId, ToolCallId};
use crate::model::{Message, RenderDirective, Role, ThoughtStatus, ToolStatus};
use crate::text::{first_non_blank, truncate_str};

/// Source used when a message names no originating actor.
pub const DEFAULT_SOURCE: &str = "agent";

/// Maximum bytes of frame data quoted in decode errors.
const PREVIEW_BYTES: usize = 200;

// ─────────────────────────────────────────────────────────────────────────────
// Event kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved type of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A chat message (`message`, `text`, `new_message`).
    Message,
    /// A thought step (`thought`).
    Thought,
    /// A tool invocation or status update (`tool`, `tool_call`).
    ToolCall,
    /// A tool result (`tool_result`).
    ToolResult,
    /// An informational side-channel notice (`system`).
    System,
    /// An error reported by the agent (`error`).
    Error,
    /// End of the current exchange (`done`).
    Done,
    /// Keep-alive and handshake frames (`pong`, `ping`, `connected`, `heartbeat`).
    Control,
}

impl EventKind {
    /// Map a wire type string (case-insensitive) to a kind.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "message" | "text" | "new_message" => Self::Message,
            "thought" => Self::Thought,
            "tool" | "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "system" => Self::System,
            "error" => Self::Error,
            "done" => Self::Done,
            "pong" | "ping" | "connected" | "heartbeat" => Self::Control,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical name, used as the subscription key for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Thought => "thought",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::System => "system",
            Self::Error => "error",
            Self::Done => "done",
            Self::Control => "control",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed events
// ─────────────────────────────────────────────────────────────────────────────

/// A thought step announcement or update.
#[derive(Clone, Debug, PartialEq)]
pub struct ThoughtEvent {
    /// Step ID.
    pub id: ThoughtId,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// New content; `None` keeps the existing content on update.
    pub content: Option<String>,
    /// Reported status.
    pub status: ThoughtStatus,
}

/// A tool call announcement (`calling`) or an in-place status update.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallEvent {
    /// Call ID.
    pub id: ToolCallId,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Tool name, if the frame named one.
    pub tool_name: Option<String>,
    /// Reported status.
    pub status: ToolStatus,
    /// Tool arguments.
    pub input: Option<Map<String, Value>>,
    /// Tool output.
    pub output: Option<Value>,
    /// Error text.
    pub error: Option<String>,
}

/// The result of a previously announced tool call.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResultEvent {
    /// ID of the call this result belongs to.
    pub call_id: ToolCallId,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Tool output.
    pub output: Option<Value>,
    /// Error text; its presence marks the call as failed.
    pub error: Option<String>,
}

/// A typed event received from the remote agent.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// A complete chat message.
    Message(Message),
    /// A thought step.
    Thought(ThoughtEvent),
    /// A tool call or tool status update.
    ToolCall(ToolCallEvent),
    /// A tool result.
    ToolResult(ToolResultEvent),
    /// An informational notice.
    System {
        /// Event time.
        timestamp: DateTime<Utc>,
        /// Notice text.
        content: String,
    },
    /// An error reported by the agent.
    Error {
        /// Event time.
        timestamp: DateTime<Utc>,
        /// Error text.
        message: String,
    },
    /// The current exchange is complete.
    Done {
        /// Event time.
        timestamp: DateTime<Utc>,
    },
}

impl ChatEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Thought(_) => EventKind::Thought,
            Self::ToolCall(_) => EventKind::ToolCall,
            Self::ToolResult(_) => EventKind::ToolResult,
            Self::System { .. } => EventKind::System,
            Self::Error { .. } => EventKind::Error,
            Self::Done { .. } => EventKind::Done,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire payload
// ─────────────────────────────────────────────────────────────────────────────

/// Loose shape of any frame; every field optional and untyped.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPayload {
    #[serde(rename = "type")]
    kind: Option<Value>,
    id: Option<Value>,
    timestamp: Option<Value>,
    role: Option<Value>,
    role_type: Option<Value>,
    source: Option<Value>,
    content: Option<Value>,
    tool_name: Option<Value>,
    tool_call_id: Option<Value>,
    input: Option<Value>,
    output: Option<Value>,
    error: Option<Value>,
    status: Option<Value>,
    component: Option<Value>,
    #[serde(rename = "componentProps", alias = "component_props")]
    component_props: Option<Value>,
    metadata: Option<Value>,
}

/// A frame with its text fields coerced to strings.
#[derive(Debug, Default)]
struct WirePayload {
    kind: Option<String>,
    id: Option<String>,
    timestamp: Option<Value>,
    role: Option<String>,
    role_type: Option<String>,
    source: Option<String>,
    content: Option<String>,
    tool_name: Option<String>,
    tool_call_id: Option<String>,
    input: Option<Value>,
    output: Option<Value>,
    error: Option<Value>,
    status: Option<String>,
    component: Option<String>,
    component_props: Option<Map<String, Value>>,
    metadata: Option<Value>,
}

impl From<RawPayload> for WirePayload {
    fn from(raw: RawPayload) -> Self {
        Self {
            kind: text_field("type", raw.kind),
            id: text_field("id", raw.id),
            timestamp: raw.timestamp,
            role: text_field("role", raw.role),
            role_type: text_field("role_type", raw.role_type),
            source: text_field("source", raw.source),
            content: text_field("content", raw.content),
            tool_name: text_field("tool_name", raw.tool_name),
            tool_call_id: text_field("tool_call_id", raw.tool_call_id),
            input: raw.input,
            output: raw.output,
            error: raw.error,
            status: text_field("status", raw.status),
            component: text_field("component", raw.component),
            component_props: match raw.component_props {
                None | Some(Value::Null) => None,
                Some(Value::Object(map)) => Some(map),
                Some(other) => {
                    debug!(props = %other, "ignoring non-object component props");
                    None
                }
            },
            metadata: raw.metadata,
        }
    }
}

/// Coerce a loosely typed field to text.
///
/// Scalars are stringified. Arrays of content blocks join their text parts;
/// anything else falls back to its JSON rendering.
fn text_field(field: &'static str, raw: Option<Value>) -> Option<String> {
    let value = raw?;
    let text = match value {
        Value::Null => return None,
        Value::String(s) => return Some(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => structured_text(&other),
    };
    debug!(field, "coerced non-string field to text");
    Some(text)
}

fn structured_text(value: &Value) -> String {
    let joined = match value {
        Value::Array(blocks) => {
            let parts: Vec<&str> = blocks.iter().filter_map(block_text).collect();
            (!parts.is_empty()).then(|| parts.concat())
        }
        other => block_text(other).map(str::to_owned),
    };
    joined.unwrap_or_else(|| value.to_string())
}

/// Text of one content block: a bare string or `{"text": ...}`.
fn block_text(block: &Value) -> Option<&str> {
    match block {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("text").and_then(Value::as_str),
        _ => None,
    }
}

/// Decode one frame.
///
/// `hint` is the framing-level event type (SSE `event:` line), if any.
/// `received_at` stands in for missing or unreadable timestamps.
///
/// Returns `Ok(None)` for control frames that should be swallowed.
pub fn decode_event(
    hint: Option<&str>,
    data: &str,
    received_at: DateTime<Utc>,
) -> Result<Option<ChatEvent>, DecodeError> {
    let invalid = |source| DecodeError::InvalidJson {
        source,
        preview: truncate_str(data, PREVIEW_BYTES).to_owned(),
    };

    let value: Value = serde_json::from_str(data).map_err(invalid)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let payload = WirePayload::from(serde_json::from_value::<RawPayload>(value).map_err(invalid)?);

    let type_name =
        first_non_blank([payload.kind.as_deref(), hint]).ok_or(DecodeError::MissingType)?;
    let kind =
        EventKind::parse(type_name).ok_or_else(|| DecodeError::UnknownType(type_name.to_owned()))?;

    let timestamp = parse_timestamp(payload.timestamp.as_ref()).unwrap_or(received_at);

    let event = match kind {
        EventKind::Control => {
            debug!(event_type = type_name, "control frame");
            return Ok(None);
        }
        EventKind::Message => ChatEvent::Message(decode_message(payload, timestamp)),
        EventKind::Thought => ChatEvent::Thought(ThoughtEvent {
            id: payload.id.map_or_else(ThoughtId::new, ThoughtId::from),
            timestamp,
            status: thought_status(payload.status.as_deref()),
            content: payload.content,
        }),
        EventKind::ToolCall => {
            let error = error_text(payload.error.as_ref());
            ChatEvent::ToolCall(ToolCallEvent {
                id: payload.id.map_or_else(ToolCallId::new, ToolCallId::from),
                timestamp,
                tool_name: payload.tool_name.filter(|n| !n.trim().is_empty()),
                status: tool_status(payload.status.as_deref(), error.is_some()),
                input: input_map(payload.input),
                output: payload.output.filter(|v| !v.is_null()),
                error,
            })
        }
        EventKind::ToolResult => {
            let call_id = first_non_blank([payload.tool_call_id.as_deref(), payload.id.as_deref()])
                .map_or_else(ToolCallId::new, ToolCallId::from);
            ChatEvent::ToolResult(ToolResultEvent {
                call_id,
                timestamp,
                output: payload.output.filter(|v| !v.is_null()),
                error: error_text(payload.error.as_ref()),
            })
        }
        EventKind::System => ChatEvent::System {
            timestamp,
            content: payload.content.unwrap_or_default(),
        },
        EventKind::Error => ChatEvent::Error {
            timestamp,
            message: error_text(payload.error.as_ref())
                .or_else(|| payload.content.filter(|c| !c.trim().is_empty()))
                .unwrap_or_else(|| "unknown error".to_owned()),
        },
        EventKind::Done => ChatEvent::Done { timestamp },
    };
    Ok(Some(event))
}

fn decode_message(payload: WirePayload, timestamp: DateTime<Utc>) -> Message {
    let role = match payload.role.as_deref() {
        None => Role::Assistant,
        Some(raw) => Role::parse(raw).unwrap_or_else(|| {
            debug!(role = raw, "unrecognized role, treating as assistant");
            Role::Assistant
        }),
    };
    let source = first_non_blank([payload.role_type.as_deref(), payload.source.as_deref()])
        .unwrap_or(DEFAULT_SOURCE)
        .to_owned();
    let render = payload
        .component
        .filter(|c| !c.trim().is_empty())
        .map(|component| RenderDirective {
            component,
            props: payload.component_props.unwrap_or_default(),
        });
    let attachments = payload
        .metadata
        .as_ref()
        .and_then(|m| m.get("files"))
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Message {
        id: payload.id.map_or_else(MessageId::new, MessageId::from),
        timestamp,
        role,
        source,
        content: payload.content.unwrap_or_default(),
        render,
        attachments,
        metadata: payload.metadata.filter(|m| !m.is_null()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field normalization
// ─────────────────────────────────────────────────────────────────────────────

fn thought_status(raw: Option<&str>) -> ThoughtStatus {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("completed" | "complete" | "done" | "success") => ThoughtStatus::Completed,
        _ => ThoughtStatus::Thinking,
    }
}

fn tool_status(raw: Option<&str>, has_error: bool) -> ToolStatus {
    let Some(raw) = raw else {
        return ToolStatus::Calling;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "calling" | "running" | "pending" => ToolStatus::Calling,
        "success" | "completed" | "done" | "ok" => ToolStatus::Success,
        "error" | "failed" | "failure" => ToolStatus::Error,
        _ if has_error => ToolStatus::Error,
        _ => ToolStatus::Success,
    }
}

/// Error payloads may be strings, objects with a `message`, or `null`.
fn error_text(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => Some(
            obj.get("message")
                .and_then(Value::as_str)
                .map_or_else(|| Value::Object(obj.clone()).to_string(), str::to_owned),
        ),
        other => Some(other.to_string()),
    }
}

fn input_map(raw: Option<Value>) -> Option<Map<String, Value>> {
    match raw? {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            debug!(input = %other, "ignoring non-object tool input");
            None
        }
    }
}

/// Accepts RFC 3339, naive ISO-8601 (as UTC), and epoch seconds or millis.
fn parse_timestamp(raw: Option<&Value>) -> Option<DateTime<Utc>> {
    match raw? {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_timestamp_text(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_text(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    // Anything this large is already milliseconds (1e11 s is year 5138).
    let millis = if value.abs() >= 1e11 {
        value
    } else {
        value * 1000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}
