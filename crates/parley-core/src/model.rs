//! Chat state entities.
//!
//! These are the records the chat state holds and the rendering layer reads:
//! [`Message`], [`ThoughtStep`], and [`ToolCall`]. Messages are immutable once
//! inserted; thought steps and tool calls are updated in place by ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{MessageId, ThoughtId, ToolCallId};

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Conversation role of a message author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human on this side of the conversation (or another human source).
    User,
    /// The remote agent.
    Assistant,
    /// System notices.
    System,
}

impl Role {
    /// Parse a wire role, case-insensitively. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Asks the renderer to draw a named component instead of plain text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDirective {
    /// Component name understood by the renderer.
    pub component: String,
    /// Arbitrary properties passed to the component.
    #[serde(default)]
    pub props: Map<String, Value>,
}

/// One chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID.
    pub id: MessageId,
    /// When the message was sent (or received, if the wire had no timestamp).
    pub timestamp: DateTime<Utc>,
    /// Conversation role.
    pub role: Role,
    /// Originating actor (`user`, `api`, `fleet`, ...). Open-ended.
    pub source: String,
    /// Text content, possibly markdown.
    pub content: String,
    /// Structured render directive, used instead of `content` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderDirective>,
    /// URLs of already-uploaded attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Remote metadata, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Thoughts
// ─────────────────────────────────────────────────────────────────────────────

/// Progress of a thought step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtStatus {
    /// Still being worked on.
    Thinking,
    /// Finished.
    Completed,
}

/// One step of the agent's visible reasoning chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtStep {
    /// Step ID; later events with the same ID update this step.
    pub id: ThoughtId,
    /// When the step started.
    pub timestamp: DateTime<Utc>,
    /// Free text.
    pub content: String,
    /// Current status.
    pub status: ThoughtStatus,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool calls
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Invoked, no result yet.
    Calling,
    /// Finished with output.
    Success,
    /// Finished with an error.
    Error,
}

impl ToolStatus {
    /// Whether the call has finished.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Calling)
    }
}

/// One tool invocation and, once known, its outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Call ID; results correlate on this.
    pub id: ToolCallId,
    /// When the call was announced.
    pub timestamp: DateTime<Utc>,
    /// Tool name.
    pub tool_name: String,
    /// Current status.
    pub status: ToolStatus,
    /// Arguments passed to the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Map<String, Value>>,
    /// Tool output, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error text, if the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("User"), Some(Role::User));
        assert_eq!(Role::parse(" assistant "), Some(Role::Assistant));
        assert_eq!(Role::parse("SYSTEM"), Some(Role::System));
        assert_eq!(Role::parse("moderator"), None);
    }

    #[test]
    fn tool_status_terminal() {
        assert!(!ToolStatus::Calling.is_terminal());
        assert!(ToolStatus::Success.is_terminal());
        assert!(ToolStatus::Error.is_terminal());
    }

    #[test]
    fn tool_call_serializes_camel_case() {
        let call = ToolCall {
            id: ToolCallId::from("tc1"),
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            tool_name: "search".into(),
            status: ToolStatus::Calling,
            input: None,
            output: None,
            error: None,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["toolName"], "search");
        assert_eq!(json["status"], "calling");
        assert!(json.get("output").is_none());
    }
}
