//! # parley-transport
//!
//! Stream transports for the Parley chat client.
//!
//! Two variants sit behind the [`Transport`] trait:
//!
//! - [`SseTransport`]: each `send` POSTs a request and reads the streamed
//!   `text/event-stream` reply until the server closes it
//! - [`SocketTransport`]: one persistent WebSocket with client heartbeat and
//!   exponential-backoff reconnect
//!
//! Both decode frames into [`ChatEvent`](parley_core::ChatEvent)s and fan
//! them out to subscribers keyed by event kind. Every connection carries a
//! [`Generation`]; events from a superseded connection are dropped.

#![deny(unsafe_code)]

pub mod lifecycle;
pub mod socket;
pub mod sse;
pub mod sse_client;
pub mod subscribers;
pub mod transport;

pub use lifecycle::{DisconnectReason, Generation, GenerationCounter, TransportEvent};
pub use socket::{SocketConfig, SocketTransport};
pub use sse::{DEFAULT_EVENT, SseDecoder, SseFrame};
pub use sse_client::{SseConfig, SseTransport};
pub use subscribers::{ALL_EVENTS, Handler, SubscriptionId, Subscribers};
pub use transport::{ChatRequest, Transport, TransportMode};
