//! Persistent WebSocket transport.

pub mod client;
pub mod heartbeat;

pub use client::{SocketConfig, SocketTransport};
