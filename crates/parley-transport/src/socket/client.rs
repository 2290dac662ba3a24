//! Persistent WebSocket transport with heartbeat and reconnect.
//!
//! [`SocketTransport::connect`] spawns a supervisor task that owns the
//! socket. The supervisor connects, runs a session (reader, writer, and
//! heartbeat multiplexed with `tokio::select!`), and when the session ends
//! for any reason other than an explicit [`disconnect`](Transport::disconnect)
//! it schedules a reconnect per the [`ReconnectPolicy`]. After the allowed
//! number of consecutive failures it reports a terminal
//! [`DisconnectReason::GaveUp`] and exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use parley_core::TransportError;
use parley_core::backoff::{ReconnectPolicy, ReconnectState};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::heartbeat::{HEARTBEAT_INTERVAL, Heartbeat, is_keepalive_text, ping_frame};
use crate::lifecycle::{DisconnectReason, Generation, Hub, TransportEvent};
use crate::subscribers::{Handler, SubscriptionId};
use crate::transport::{ChatRequest, Transport, TransportMode};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// How long a closing session waits to write its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings for [`SocketTransport`].
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// Full `ws://` or `wss://` URL.
    pub url: String,
    /// Interval between client pings.
    pub heartbeat_interval: Duration,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
}

impl SocketConfig {
    /// Config with default heartbeat, timeout, and reconnect policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            connect_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

struct Shared {
    hub: Hub,
    // Writer of the open session, tagged with that session's generation.
    outbound: Mutex<Option<(Generation, mpsc::UnboundedSender<Message>)>>,
    attempts: AtomicU32,
}

impl Shared {
    /// Publish a freshly opened session. Fails if it was superseded mid-handshake.
    fn install(&self, generation: Generation, tx: mpsc::UnboundedSender<Message>) -> bool {
        let mut outbound = self.outbound.lock();
        if self.hub.current() != generation {
            return false;
        }
        *outbound = Some((generation, tx));
        let _ = self.hub.set_connected(true);
        true
    }

    /// Tear down what `generation` installed, leaving any newer session alone.
    fn release(&self, generation: Generation) {
        let mut outbound = self.outbound.lock();
        if outbound.as_ref().is_some_and(|(owner, _)| *owner == generation) {
            *outbound = None;
        }
        if self.hub.current() == generation {
            let _ = self.hub.set_connected(false);
        }
    }
}

struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// WebSocket transport.
pub struct SocketTransport {
    config: SocketConfig,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SocketTransport {
    /// Build a transport. Nothing is opened until [`connect`](Transport::connect).
    pub fn new(config: SocketConfig) -> Result<Self, TransportError> {
        if !(config.url.starts_with("ws://") || config.url.starts_with("wss://")) {
            return Err(TransportError::InvalidEndpoint(config.url));
        }
        Ok(Self {
            config,
            shared: Arc::new(Shared {
                hub: Hub::default(),
                outbound: Mutex::new(None),
                attempts: AtomicU32::new(0),
            }),
            supervisor: Mutex::new(None),
        })
    }

    /// Reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    /// Whether the supervisor is still running (connected or reconnecting).
    pub fn is_active(&self) -> bool {
        self.supervisor
            .lock()
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Queue a raw text frame on the open socket.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let outbound = self.shared.outbound.lock();
        let Some((_, tx)) = outbound.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        tx.send(Message::text(text.into()))
            .map_err(|_| TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Socket
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let mut supervisor = self.supervisor.lock();
        if supervisor.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!(url = %self.config.url, "socket already open");
            return Ok(());
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            Arc::clone(&self.shared),
            self.config.clone(),
            cancel.clone(),
        ));
        *supervisor = Some(Supervisor { cancel, task });
        Ok(())
    }

    async fn send(&self, request: &ChatRequest) -> Result<(), TransportError> {
        let payload =
            serde_json::to_string(request).map_err(|e| TransportError::Send(e.to_string()))?;
        self.send_text(payload)
    }

    fn disconnect(&self) {
        let Some(supervisor) = self.supervisor.lock().take() else {
            return;
        };
        supervisor.cancel.cancel();
        let generation = self.shared.hub.advance();
        *self.shared.outbound.lock() = None;
        let _ = self.shared.hub.set_connected(false);
        self.shared.attempts.store(0, Ordering::Release);

        if supervisor.task.is_finished() {
            return;
        }
        info!(%generation, "socket closed");
        let _ = self.shared.hub.emit(
            generation,
            TransportEvent::Disconnected {
                generation,
                reason: DisconnectReason::Closed,
            },
        );
    }

    fn on(&self, key: &str, handler: Handler) -> SubscriptionId {
        self.shared.hub.subscribers.on(key, handler)
    }

    fn off(&self, id: SubscriptionId) -> bool {
        self.shared.hub.subscribers.off(id)
    }

    fn is_connected(&self) -> bool {
        self.shared.hub.is_connected()
    }

    fn generation(&self) -> Generation {
        self.shared.hub.current()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.lock().take() {
            supervisor.cancel.cancel();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor
// ─────────────────────────────────────────────────────────────────────────────

enum SessionEnd {
    Cancelled,
    Lost(String),
}

async fn supervise(shared: Arc<Shared>, config: SocketConfig, cancel: CancellationToken) {
    let mut reconnect = ReconnectState::new(config.reconnect);

    loop {
        let generation = shared.hub.advance();
        let handshake = tokio::select! {
            () = cancel.cancelled() => return,
            result = tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str())) => result,
        };

        match handshake {
            Ok(Ok((ws, _response))) => {
                reconnect.reset();
                shared.attempts.store(0, Ordering::Release);

                let (tx, rx) = mpsc::unbounded_channel();
                if !shared.install(generation, tx) {
                    debug!(%generation, "session superseded during handshake");
                    return;
                }
                info!(%generation, url = %config.url, "socket connected");
                let _ = shared
                    .hub
                    .emit(generation, TransportEvent::Connected { generation });

                let end = run_session(&shared, ws, rx, generation, &config, &cancel).await;

                shared.release(generation);
                match end {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Lost(reason) => {
                        warn!(%generation, reason = %reason, "socket lost");
                        let _ = shared.hub.emit(
                            generation,
                            TransportEvent::Disconnected {
                                generation,
                                reason: DisconnectReason::Lost(reason),
                            },
                        );
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(%generation, error = %e, "socket connect failed");
                let _ = shared.hub.emit(
                    generation,
                    TransportEvent::Error {
                        message: TransportError::Connect(e.to_string()).to_string(),
                    },
                );
            }
            Err(_) => {
                warn!(%generation, timeout_ms = millis(config.connect_timeout), "socket connect timed out");
                let _ = shared.hub.emit(
                    generation,
                    TransportEvent::Error {
                        message: TransportError::Connect("timed out".to_owned()).to_string(),
                    },
                );
            }
        }

        let Some(attempt) = reconnect.next_attempt() else {
            let attempts = reconnect.attempts();
            warn!(attempts, "giving up on reconnect");
            shared.release(generation);
            let _ = shared.hub.emit(
                generation,
                TransportEvent::Disconnected {
                    generation,
                    reason: DisconnectReason::GaveUp { attempts },
                },
            );
            return;
        };

        shared.attempts.store(attempt.number, Ordering::Release);
        info!(
            attempt = attempt.number,
            delay_ms = millis(attempt.delay),
            "scheduling reconnect"
        );
        let _ = shared.hub.emit(
            generation,
            TransportEvent::Reconnecting {
                attempt: attempt.number,
                delay: attempt.delay,
            },
        );
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(attempt.delay) => {}
        }
    }
}

/// Pump one open socket until it closes or is cancelled.
async fn run_session(
    shared: &Shared,
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    generation: Generation,
    config: &SocketConfig,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    let mut heartbeat = Heartbeat::new(config.heartbeat_interval);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await.is_err() {
                    debug!(%generation, "close frame not written in time");
                }
                return SessionEnd::Cancelled;
            }
            () = heartbeat.tick() => {
                trace!(%generation, "sending heartbeat");
                if let Err(end) = write_frame(&mut sink, ping_frame(), cancel, "heartbeat").await {
                    return end;
                }
            }
            Some(message) = outbound.recv() => {
                if let Err(end) = write_frame(&mut sink, message, cancel, "send").await {
                    return end;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text(shared, generation, text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => handle_text(shared, generation, text),
                    Err(_) => warn!(%generation, len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "closed by server".to_owned(),
                        |f| format!("closed by server: {} {}", u16::from(f.code), f.reason.as_str()),
                    );
                    return SessionEnd::Lost(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost("stream ended".to_owned()),
            },
        }
    }
}

/// Write one frame, giving up as soon as the session is cancelled.
async fn write_frame(
    sink: &mut WsSink,
    frame: Message,
    cancel: &CancellationToken,
    what: &str,
) -> Result<(), SessionEnd> {
    tokio::select! {
        () = cancel.cancelled() => Err(SessionEnd::Cancelled),
        result = sink.send(frame) => result.map_err(|e| SessionEnd::Lost(format!("{what} failed: {e}"))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

fn handle_text(shared: &Shared, generation: Generation, text: &str) {
    if is_keepalive_text(text) {
        trace!(%generation, "keep-alive frame swallowed");
        return;
    }
    shared.hub.dispatch_frame(generation, None, text);
}
