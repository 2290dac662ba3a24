//! Pure state transitions.
//!
//! [`reduce`] maps `(state, action)` to the next state in place and reports
//! whether anything changed. It does no I/O, so replaying the same action
//! sequence against a fresh [`ChatState`] always ends in the same state.
//!
//! Update events that name an ID the state has never seen (a `tool_result`
//! for an unknown call, a completed thought that never started) are dropped
//! with a warning rather than creating placeholder entries.

use chrono::Utc;
use parley_core::events::{ThoughtEvent, ToolCallEvent, ToolResultEvent};
use parley_core::{ChatEvent, Message, MessageId, Role, ThoughtStatus, ThoughtStep, ToolCall, ToolStatus};
use tracing::{debug, warn};

use crate::state::{ChatState, SYSTEM_LOG_CAPACITY, SystemNote};

/// Name given to tool calls announced without one.
const UNNAMED_TOOL: &str = "unknown";

/// Everything that can change the chat state.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// An event decoded from the remote stream.
    Remote(ChatEvent),
    /// Optimistic insert of a locally composed message.
    AddUserMessage(Message),
    /// Take back an optimistic insert that was never sent.
    RetractMessage(MessageId),
    /// Drop all messages, thoughts, tool calls, and system notes; clear error and loading.
    Clear,
    /// Transport connection state.
    SetConnected(bool),
    /// Reply-in-flight flag.
    SetLoading(bool),
    /// Replace (or clear) the visible error.
    SetError(Option<String>),
}

impl Action {
    /// Build an [`Action::AddUserMessage`] stamped with a fresh ID and the current time.
    pub fn add_user_message(
        text: impl Into<String>,
        source: impl Into<String>,
        attachments: Vec<String>,
    ) -> Self {
        Self::AddUserMessage(user_message(text, source, attachments))
    }
}

/// A locally composed message with a fresh ID and the current time.
pub fn user_message(
    text: impl Into<String>,
    source: impl Into<String>,
    attachments: Vec<String>,
) -> Message {
    Message {
        id: MessageId::new(),
        timestamp: Utc::now(),
        role: Role::User,
        source: source.into(),
        content: text.into(),
        render: None,
        attachments,
        metadata: None,
    }
}

/// Apply `action` to `state`. Returns `true` if the state changed.
pub fn reduce(state: &mut ChatState, action: Action) -> bool {
    match action {
        Action::Remote(event) => apply_event(state, event),
        Action::AddUserMessage(message) => {
            state.messages.push(message);
            true
        }
        Action::RetractMessage(id) => {
            let before = state.messages.len();
            state.messages.retain(|m| m.id != id);
            state.messages.len() != before
        }
        Action::Clear => {
            let cleared = ChatState {
                is_connected: state.is_connected,
                clears: state.clears,
                ..ChatState::default()
            };
            if *state == cleared {
                return false;
            }
            *state = ChatState {
                clears: cleared.clears + 1,
                ..cleared
            };
            true
        }
        Action::SetConnected(connected) => set(&mut state.is_connected, connected),
        Action::SetLoading(loading) => set(&mut state.is_loading, loading),
        Action::SetError(error) => set(&mut state.error, error),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote events
// ─────────────────────────────────────────────────────────────────────────────

fn apply_event(state: &mut ChatState, event: ChatEvent) -> bool {
    // A successful event clears the previous error.
    let cleared_error = if matches!(event, ChatEvent::Error { .. }) {
        false
    } else {
        state.error.take().is_some()
    };

    let changed = match event {
        ChatEvent::Message(message) => {
            state.messages.push(message);
            true
        }
        ChatEvent::Thought(thought) => apply_thought(state, thought),
        ChatEvent::ToolCall(call) => apply_tool_call(state, call),
        ChatEvent::ToolResult(result) => apply_tool_result(state, result),
        ChatEvent::System { timestamp, content } => {
            if state.system_log.len() >= SYSTEM_LOG_CAPACITY {
                let _ = state.system_log.pop_front();
            }
            state.system_log.push_back(SystemNote { timestamp, content });
            true
        }
        ChatEvent::Error { message, .. } => {
            let error_changed = set(&mut state.error, Some(message));
            set(&mut state.is_loading, false) || error_changed
        }
        ChatEvent::Done { .. } => set(&mut state.is_loading, false),
    };
    changed || cleared_error
}

fn apply_thought(state: &mut ChatState, event: ThoughtEvent) -> bool {
    if let Some(step) = state.thoughts.iter_mut().find(|t| t.id == event.id) {
        step.status = event.status;
        if let Some(content) = event.content {
            step.content = content;
        }
        return true;
    }
    match event.status {
        ThoughtStatus::Thinking => {
            state.thoughts.push(ThoughtStep {
                id: event.id,
                timestamp: event.timestamp,
                content: event.content.unwrap_or_default(),
                status: ThoughtStatus::Thinking,
            });
            true
        }
        ThoughtStatus::Completed => {
            warn!(thought_id = %event.id, "thought update for unknown id, dropping");
            false
        }
    }
}

fn apply_tool_call(state: &mut ChatState, event: ToolCallEvent) -> bool {
    let existing = state.tool_calls.iter_mut().find(|c| c.id == event.id);

    match (event.status, existing) {
        (ToolStatus::Calling, Some(_)) => {
            debug!(tool_call_id = %event.id, "duplicate tool call announcement, ignoring");
            false
        }
        (ToolStatus::Calling, None) => {
            state.tool_calls.push(ToolCall {
                id: event.id,
                timestamp: event.timestamp,
                tool_name: event.tool_name.unwrap_or_else(|| UNNAMED_TOOL.to_owned()),
                status: ToolStatus::Calling,
                input: event.input,
                output: event.output,
                error: event.error,
            });
            true
        }
        (status, Some(call)) => {
            call.status = status;
            if event.output.is_some() {
                call.output = event.output;
            }
            if event.error.is_some() {
                call.error = event.error;
            }
            true
        }
        (_, None) => {
            warn!(tool_call_id = %event.id, "tool update for unknown id, dropping");
            false
        }
    }
}

fn apply_tool_result(state: &mut ChatState, event: ToolResultEvent) -> bool {
    let Some(call) = state.tool_calls.iter_mut().find(|c| c.id == event.call_id) else {
        warn!(tool_call_id = %event.call_id, "tool result for unknown id, dropping");
        return false;
    };
    call.status = if event.error.is_some() {
        ToolStatus::Error
    } else {
        ToolStatus::Success
    };
    if event.output.is_some() {
        call.output = event.output;
    }
    call.error = event.error;
    true
}

// ── helpers ──

fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
