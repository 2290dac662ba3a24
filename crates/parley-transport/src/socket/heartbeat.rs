//! Client-side keep-alive.
//!
//! While a socket is open the client sends a bare text `ping` every interval.
//! The server answers with a `pong` frame, which is swallowed rather than
//! surfaced as an event.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;

/// Default interval between pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Payload of the client ping frame.
pub const PING_TEXT: &str = "ping";

/// Ping timer. The first tick fires one full interval after creation.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Interval,
}

impl Heartbeat {
    /// Timer firing every `period`.
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait for the next ping time.
    pub async fn tick(&mut self) {
        let _ = self.interval.tick().await;
    }
}

/// The frame sent on every tick.
pub fn ping_frame() -> Message {
    Message::text(PING_TEXT)
}

/// Whether a text frame is a bare keep-alive that should never be decoded.
pub fn is_keepalive_text(text: &str) -> bool {
    matches!(text.trim(), "ping" | "pong")
}
