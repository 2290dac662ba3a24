//! Connection lifecycle: notifications, generation tokens, and the dispatch hub.
//!
//! Every connection (and every explicit disconnect) advances the transport's
//! [`Generation`]. Events are tagged with the generation of the connection
//! that produced them, and [`Hub::emit`] drops any event whose generation is
//! no longer current. The check and the delivery run under the same lock
//! that [`Hub::advance`] takes, so once `advance` returns no frame from a
//! superseded connection can reach a subscriber.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::ReentrantMutex;
use parley_core::ChatEvent;
use parley_core::events::decode_event;
use tracing::{trace, warn};

use crate::subscribers::Subscribers;

// ─────────────────────────────────────────────────────────────────────────────
// Generation tokens
// ─────────────────────────────────────────────────────────────────────────────

/// Identifies one connection of a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Wrap a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic generation source.
#[derive(Debug, Default)]
pub struct GenerationCounter(AtomicU64);

impl GenerationCounter {
    /// Start a new generation, invalidating the previous one.
    pub fn advance(&self) -> Generation {
        Generation(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Current generation.
    pub fn current(&self) -> Generation {
        Generation(self.0.load(Ordering::Acquire))
    }

    /// Whether `generation` is still current.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Closed,
    /// The streamed reply finished normally.
    StreamEnded,
    /// The connection dropped unexpectedly.
    Lost(String),
    /// Every reconnect attempt failed; no more automatic retries.
    GaveUp {
        /// Consecutive reconnect attempts made.
        attempts: u32,
    },
}

impl DisconnectReason {
    /// Whether the transport has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GaveUp { .. })
    }
}

/// What a transport tells its subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// A connection opened.
    Connected {
        /// Generation of the new connection.
        generation: Generation,
    },
    /// A connection closed.
    Disconnected {
        /// Generation of the closed connection.
        generation: Generation,
        /// Why it closed.
        reason: DisconnectReason,
    },
    /// A reconnect is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// A connection-level failure.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// A decoded event from the remote agent.
    Event(ChatEvent),
}

impl TransportEvent {
    /// Subscription key: `connected`, `disconnected`, `reconnecting`, `error`,
    /// or the remote event's kind (`message`, `thought`, `tool_call`, ...).
    ///
    /// Remote `error` events share the `error` key with connection errors.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Error { .. } => "error",
            Self::Event(event) => event.kind().as_str(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hub
// ─────────────────────────────────────────────────────────────────────────────

/// Subscribers, generation counter, and connected flag shared by a
/// transport and its background task.
#[derive(Debug, Default)]
pub(crate) struct Hub {
    pub(crate) subscribers: Subscribers,
    generations: GenerationCounter,
    connected: AtomicBool,
    // Reentrant so a handler may call disconnect() from inside dispatch.
    dispatch_lock: ReentrantMutex<()>,
}

impl Hub {
    /// Start a new generation. Blocks until any in-progress dispatch finishes.
    pub(crate) fn advance(&self) -> Generation {
        let _guard = self.dispatch_lock.lock();
        self.generations.advance()
    }

    pub(crate) fn current(&self) -> Generation {
        self.generations.current()
    }

    /// Deliver `event` if `generation` is still current.
    pub(crate) fn emit(&self, generation: Generation, event: TransportEvent) -> bool {
        let _guard = self.dispatch_lock.lock();
        if !self.generations.is_current(generation) {
            trace!(%generation, key = event.key(), "dropping event from stale connection");
            return false;
        }
        let _ = self.subscribers.emit(&event);
        true
    }

    /// Decode one frame and deliver it. Undecodable frames are logged and dropped.
    pub(crate) fn dispatch_frame(&self, generation: Generation, hint: Option<&str>, data: &str) {
        match decode_event(hint, data, Utc::now()) {
            Ok(Some(event)) => {
                let _ = self.emit(generation, TransportEvent::Event(event));
            }
            Ok(None) => trace!(%generation, "control frame swallowed"),
            Err(e) => warn!(%generation, kind = e.kind(), error = %e, "dropping undecodable frame"),
        }
    }

    pub(crate) fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::AcqRel)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_hub() -> (Hub, Arc<Mutex<Vec<TransportEvent>>>) {
        let hub = Hub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = hub.subscribers.on(
            crate::subscribers::ALL_EVENTS,
            Arc::new(move |e: &TransportEvent| sink.lock().push(e.clone())),
        );
        (hub, seen)
    }

    #[test]
    fn generations_increase() {
        let counter = GenerationCounter::default();
        assert_eq!(counter.current().value(), 0);
        let g1 = counter.advance();
        let g2 = counter.advance();
        assert!(g2 > g1);
        assert!(counter.is_current(g2));
        assert!(!counter.is_current(g1));
    }

    #[test]
    fn stale_events_are_dropped() {
        let (hub, seen) = recording_hub();
        let old = hub.advance();
        let new = hub.advance();

        assert!(!hub.emit(old, TransportEvent::Connected { generation: old }));
        assert!(hub.emit(new, TransportEvent::Connected { generation: new }));
        assert_eq!(*seen.lock(), vec![TransportEvent::Connected { generation: new }]);
    }

    #[test]
    fn frames_are_decoded_and_bad_ones_skipped() {
        let (hub, seen) = recording_hub();
        let g = hub.advance();
        hub.dispatch_frame(g, Some("message"), r#"{"content":"one"}"#);
        hub.dispatch_frame(g, None, "{not json");
        hub.dispatch_frame(g, None, r#"{"type":"pong"}"#);
        hub.dispatch_frame(g, None, r#"{"type":"done"}"#);

        let keys: Vec<&str> = seen.lock().iter().map(TransportEvent::key).collect();
        assert_eq!(keys, vec!["message", "done"]);
    }

    #[test]
    fn handler_can_advance_during_dispatch() {
        let hub = Arc::new(Hub::default());
        let inner = Arc::clone(&hub);
        let _ = hub.subscribers.on(
            "connected",
            Arc::new(move |_e: &TransportEvent| {
                let _ = inner.advance();
            }),
        );
        let g = hub.advance();
        assert!(hub.emit(g, TransportEvent::Connected { generation: g }));
        assert!(!hub.generations.is_current(g));
    }

    #[test]
    fn event_keys() {
        assert_eq!(
            TransportEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .key(),
            "reconnecting"
        );
        assert_eq!(
            TransportEvent::Error {
                message: "x".into()
            }
            .key(),
            "error"
        );
        assert!(DisconnectReason::GaveUp { attempts: 5 }.is_terminal());
        assert!(!DisconnectReason::Lost("eof".into()).is_terminal());
    }
}
