//! Request-initiated streaming over HTTP + SSE.
//!
//! Each [`send`](SseTransport::send) POSTs a [`ChatRequest`] and, once the
//! server accepts it, reads the `text/event-stream` reply on a background
//! task until the server closes it. Only one reply may be in flight; a second
//! `send` fails with [`TransportError::Busy`]. Failures are reported to the
//! caller and to subscribers and are never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use parley_core::TransportError;
use parley_core::text::truncate_str;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lifecycle::{DisconnectReason, Generation, Hub, TransportEvent};
use crate::sse::SseDecoder;
use crate::subscribers::{Handler, SubscriptionId};
use crate::transport::{ChatRequest, Transport, TransportMode};

/// Maximum bytes of an error response body kept in [`TransportError::Http`].
const ERROR_BODY_BYTES: usize = 500;

/// Settings for [`SseTransport`].
#[derive(Clone, Debug)]
pub struct SseConfig {
    /// Full URL of the streaming endpoint.
    pub url: String,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// A reply silent for this long is treated as lost.
    pub idle_timeout: Duration,
}

impl SseConfig {
    /// Config with default timeouts (30s connect, 90s idle).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// The reply currently being read.
struct ActiveStream {
    /// `None` while the slot is reserved but the request not yet started.
    generation: Option<Generation>,
    cancel: CancellationToken,
}

struct Shared {
    hub: Hub,
    active: Mutex<Option<ActiveStream>>,
}

impl Shared {
    /// Clear the active slot if it still belongs to `generation`.
    fn release(&self, generation: Generation) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.generation == Some(generation)) {
            *active = None;
        }
    }
}

/// SSE transport.
pub struct SseTransport {
    client: reqwest::Client,
    config: SseConfig,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SseTransport {
    /// Build a transport with its own HTTP client.
    pub fn new(config: SseConfig) -> Result<Self, TransportError> {
        if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
            return Err(TransportError::InvalidEndpoint(config.url));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            config,
            shared: Arc::new(Shared {
                hub: Hub::default(),
                active: Mutex::new(None),
            }),
        })
    }

    /// Whether a reply is being read (or requested) right now.
    pub fn is_streaming(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    fn fail(&self, generation: Generation, error: TransportError) -> TransportError {
        self.shared.release(generation);
        warn!(%generation, kind = error.kind(), error = %error, "stream request failed");
        let _ = self.shared.hub.emit(
            generation,
            TransportEvent::Error {
                message: error.to_string(),
            },
        );
        error
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Stream
    }

    /// Nothing to open ahead of time; the stream starts with `send`.
    async fn connect(&self) -> Result<(), TransportError> {
        debug!(url = %self.config.url, "stream transport connects per request");
        Ok(())
    }

    async fn send(&self, request: &ChatRequest) -> Result<(), TransportError> {
        // Reserve the slot first; the generation is assigned outside the slot
        // lock because advancing waits for in-progress dispatch.
        let cancel = CancellationToken::new();
        {
            let mut active = self.shared.active.lock();
            if active.is_some() {
                return Err(TransportError::Busy);
            }
            *active = Some(ActiveStream {
                generation: None,
                cancel: cancel.clone(),
            });
        }
        let generation = self.shared.hub.advance();
        {
            let mut active = self.shared.active.lock();
            match active.as_mut() {
                Some(slot) if !cancel.is_cancelled() => slot.generation = Some(generation),
                _ => return Ok(()),
            }
        }

        debug!(%generation, url = %self.config.url, thread_id = %request.thread_id, "opening stream");
        let pending = self
            .client
            .post(&self.config.url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => {
                debug!(%generation, "stream cancelled before response");
                return Ok(());
            }
            result = pending => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => return Err(self.fail(generation, TransportError::Request(e.to_string()))),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = TransportError::Http {
                status: status.as_u16(),
                body: truncate_str(&body, ERROR_BODY_BYTES).to_owned(),
            };
            return Err(self.fail(generation, error));
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !content_type.starts_with("text/event-stream") {
                debug!(%generation, content_type, "stream response has unexpected content type");
            }
        }

        let _ = self.shared.hub.set_connected(true);
        if !self
            .shared
            .hub
            .emit(generation, TransportEvent::Connected { generation })
        {
            // disconnected while the request was in flight
            let _ = self.shared.hub.set_connected(false);
            return Ok(());
        }
        info!(%generation, "stream opened");

        let _ = tokio::spawn(read_stream(
            Arc::clone(&self.shared),
            response.bytes_stream(),
            generation,
            cancel,
            self.config.idle_timeout,
        ));
        Ok(())
    }

    fn disconnect(&self) {
        let Some(active) = self.shared.active.lock().take() else {
            return;
        };
        active.cancel.cancel();
        let generation = self.shared.hub.advance();
        let _ = self.shared.hub.set_connected(false);
        info!(%generation, "stream closed");
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

    fn is_busy(&self) -> bool {
        self.is_streaming()
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(active) = self.shared.active.lock().take() {
            active.cancel.cancel();
        }
    }
}

/// Read one reply until it ends, fails, idles out, or is cancelled.
async fn read_stream<S>(
    shared: Arc<Shared>,
    mut body: S,
    generation: Generation,
    cancel: CancellationToken,
    idle_timeout: Duration,
) where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let mut decoder = SseDecoder::new();

    let reason = loop {
        let next = tokio::select! {
            // disconnect() has already notified subscribers
            () = cancel.cancelled() => return,
            next = tokio::time::timeout(idle_timeout, body.next()) => next,
        };
        match next {
            Ok(Some(Ok(chunk))) => {
                for frame in decoder.push(&chunk) {
                    shared
                        .hub
                        .dispatch_frame(generation, Some(frame.event_type()), &frame.data);
                }
            }
            Ok(Some(Err(e))) => break DisconnectReason::Lost(e.to_string()),
            Ok(None) => {
                if let Some(frame) = decoder.finish() {
                    shared
                        .hub
                        .dispatch_frame(generation, Some(frame.event_type()), &frame.data);
                }
                break DisconnectReason::StreamEnded;
            }
            Err(_) => {
                break DisconnectReason::Lost(format!(
                    "no data for {}ms",
                    idle_timeout.as_millis()
                ));
            }
        }
    };

    shared.release(generation);
    if shared.hub.current() != generation {
        return;
    }
    let _ = shared.hub.set_connected(false);
    if let DisconnectReason::Lost(message) = &reason {
        warn!(%generation, error = %message, "stream lost");
        let _ = shared.hub.emit(
            generation,
            TransportEvent::Error {
                message: format!("stream lost: {message}"),
            },
        );
    } else {
        debug!(%generation, "stream ended");
    }
    let _ = shared
        .hub
        .emit(generation, TransportEvent::Disconnected { generation, reason });
}
