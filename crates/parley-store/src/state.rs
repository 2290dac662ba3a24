//! The chat view model.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parley_core::{Message, ThoughtId, ThoughtStep, ToolCall, ToolCallId};
use serde::Serialize;

/// System notes kept in [`ChatState::system_log`].
pub const SYSTEM_LOG_CAPACITY: usize = 200;

/// One informational notice from the agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNote {
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Notice text.
    pub content: String,
}

/// Everything the rendering layer reads.
///
/// Collections are in arrival order and never reordered by timestamp.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    /// Chat messages.
    pub messages: Vec<Message>,
    /// Thought chain.
    pub thoughts: Vec<ThoughtStep>,
    /// Tool invocations.
    pub tool_calls: Vec<ToolCall>,
    /// Most recent system notes, oldest first.
    pub system_log: VecDeque<SystemNote>,
    /// Whether the transport currently has an open connection.
    pub is_connected: bool,
    /// Whether a reply is in flight.
    pub is_loading: bool,
    /// Last error to show, if any.
    pub error: Option<String>,
    /// Number of clears that discarded something.
    pub clears: u64,
}

impl ChatState {
    /// Look up a thought step by ID.
    pub fn thought(&self, id: &ThoughtId) -> Option<&ThoughtStep> {
        self.thoughts.iter().find(|t| &t.id == id)
    }

    /// Look up a tool call by ID.
    pub fn tool_call(&self, id: &ToolCallId) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|c| &c.id == id)
    }

    /// True when no messages, thoughts, or tool calls are held.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.thoughts.is_empty() && self.tool_calls.is_empty()
    }
}
