//! Incremental terminal rendering of chat state.
//!
//! The store only hands out whole snapshots, so [`Renderer`] remembers what
//! it has already printed and emits lines for the difference: new messages,
//! new or changed thought steps and tool calls, new system notes, and
//! connection or error transitions.

use std::collections::{HashMap, HashSet};

use parley_core::roles::{Accent, display_for};
use parley_core::text::truncate_str;
use parley_core::{Message, MessageId, ThoughtId, ThoughtStatus, ThoughtStep, ToolCall, ToolCallId, ToolStatus};
use parley_store::{ChatState, SystemNote};
use serde_json::Value;

/// Longest tool input/output shown inline.
const DETAIL_BYTES: usize = 200;

/// Remembers what has been printed.
#[derive(Debug, Default)]
pub struct Renderer {
    color: bool,
    clears: u64,
    messages: HashSet<MessageId>,
    thoughts: HashMap<ThoughtId, ThoughtStatus>,
    tools: HashMap<ToolCallId, ToolStatus>,
    last_note: Option<SystemNote>,
    error: Option<String>,
    connected: bool,
}

impl Renderer {
    /// Renderer emitting ANSI colour when `color` is set.
    pub fn new(color: bool) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// Lines to print for everything that changed since the last call.
    pub fn render(&mut self, state: &ChatState) -> Vec<String> {
        if state.clears != self.clears {
            *self = Self {
                clears: state.clears,
                ..Self::new(self.color)
            };
        }
        let mut lines = Vec::new();

        if state.is_connected != self.connected {
            self.connected = state.is_connected;
            lines.push(if state.is_connected {
                "── connected ──".to_owned()
            } else {
                "── disconnected ──".to_owned()
            });
        }

        for step in &state.thoughts {
            if self.thoughts.insert(step.id.clone(), step.status) != Some(step.status) {
                lines.push(thought_line(step));
            }
        }
        for call in &state.tool_calls {
            if self.tools.insert(call.id.clone(), call.status) != Some(call.status) {
                lines.push(tool_line(call));
            }
        }
        for message in &state.messages {
            if self.messages.insert(message.id.clone()) {
                lines.extend(self.message_lines(message));
            }
        }

        let start = self.last_note.as_ref().map_or(0, |last| {
            state
                .system_log
                .iter()
                .rposition(|note| note == last)
                .map_or(0, |i| i + 1)
        });
        for note in state.system_log.iter().skip(start) {
            lines.push(format!("  ℹ {}", note.content));
        }
        if let Some(note) = state.system_log.back() {
            self.last_note = Some(note.clone());
        }

        if state.error != self.error {
            self.error.clone_from(&state.error);
            if let Some(error) = &state.error {
                lines.push(self.paint(Accent::Red, &format!("error: {error}")));
            }
        }
        lines
    }

    fn message_lines(&self, message: &Message) -> Vec<String> {
        let role = display_for(&message.source);
        let author = self.paint(role.accent, &role.to_string());
        let mut lines = vec![format!("{author}: {}", message.content)];
        if let Some(render) = &message.render {
            lines.push(format!("  ▣ {}", render.component));
        }
        lines.extend(message.attachments.iter().map(|url| format!("  📎 {url}")));
        lines
    }

    fn paint(&self, accent: Accent, text: &str) -> String {
        if self.color {
            format!("\x1b[{}m{text}\x1b[0m", ansi_code(accent))
        } else {
            text.to_owned()
        }
    }
}

fn thought_line(step: &ThoughtStep) -> String {
    match step.status {
        ThoughtStatus::Thinking => format!("  … {}", step.content),
        ThoughtStatus::Completed => format!("  ✓ {}", step.content),
    }
}

fn tool_line(call: &ToolCall) -> String {
    match call.status {
        ToolStatus::Calling => {
            let input = call
                .input
                .as_ref()
                .map(|input| compact(&Value::Object(input.clone())))
                .unwrap_or_default();
            format!("  ⚙ {}({input})", call.tool_name)
        }
        ToolStatus::Success => {
            let output = call.output.as_ref().map(compact).unwrap_or_default();
            format!("  ✓ {} → {output}", call.tool_name)
        }
        ToolStatus::Error => format!(
            "  ✗ {}: {}",
            call.tool_name,
            call.error.as_deref().unwrap_or("failed")
        ),
    }
}

fn compact(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let shown = truncate_str(&text, DETAIL_BYTES);
    if shown.len() < text.len() {
        format!("{shown}…")
    } else {
        text
    }
}

fn ansi_code(accent: Accent) -> &'static str {
    match accent {
        Accent::Blue => "34",
        Accent::Green => "32",
        Accent::Red => "31",
        Accent::Purple => "35",
        Accent::Yellow => "33",
        Accent::Cyan => "36",
        Accent::Orange => "38;5;208",
        Accent::Pink => "38;5;205",
        Accent::Teal => "38;5;30",
        Accent::Gray => "90",
    }
}
