//! # parley-core
//!
//! Foundation types, wire events, errors, and branded IDs for the Parley chat client.
//!
//! This crate provides the shared vocabulary that the other Parley crates depend on:
//!
//! - **Branded IDs**: `MessageId`, `ThoughtId`, `ToolCallId`, `ThreadId` as newtypes
//! - **Model**: `Message`, `ThoughtStep`, `ToolCall` as held by the chat state
//! - **Events**: [`events::decode_event`] turns one JSON frame into a typed [`ChatEvent`]
//! - **Roles**: display metadata for well-known sources plus a hashed fallback
//! - **Errors**: `DecodeError`, `TransportError`, `ClientError` via `thiserror`
//! - **Backoff**: reconnect delay math shared by the socket transport

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod model;
pub mod roles;
pub mod text;

pub use errors::{ClientError, DecodeError, TransportError};
pub use events::ChatEvent;
pub use ids::{MessageId, ThoughtId, ThreadId, ToolCallId};
pub use model::{Message, RenderDirective, Role, ThoughtStatus, ThoughtStep, ToolCall, ToolStatus};
