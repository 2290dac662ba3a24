//! The chat client: one transport bound to one store.

use std::sync::Arc;

use parley_core::{ClientError, MessageId, ThreadId, TransportError};
use parley_store::{Action, ChatStore};
use parley_transport::{ALL_EVENTS, ChatRequest, SubscriptionId, Transport, TransportMode};
use tracing::{debug, info, warn};

use crate::bridge::store_handler;

/// Sends composed messages and keeps a [`ChatStore`] in sync with a transport.
///
/// Dropping the client unsubscribes from the transport and disconnects it.
pub struct ChatClient {
    store: Arc<ChatStore>,
    transport: Arc<dyn Transport>,
    subscription: SubscriptionId,
    thread_id: ThreadId,
    source: String,
}

impl ChatClient {
    /// Subscribe `store` to `transport`. `source` is the default sender for
    /// [`send_message`](Self::send_message).
    pub fn new(
        store: Arc<ChatStore>,
        transport: Arc<dyn Transport>,
        thread_id: ThreadId,
        source: impl Into<String>,
    ) -> Self {
        let subscription = transport.on(ALL_EVENTS, store_handler(Arc::clone(&store)));
        Self {
            store,
            transport,
            subscription,
            thread_id,
            source: source.into(),
        }
    }

    /// The store this client writes to.
    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    /// The bound transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Conversation thread.
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Open the transport. A no-op for the streamed-reply variant.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.transport.connect().await.map_err(ClientError::from)
    }

    /// Insert `text` as a user message and send it to the agent.
    ///
    /// In stream mode the loading flag gates the composer: a second message
    /// while a reply is in flight is rejected with `Busy` before anything is
    /// inserted. The gate also holds until the transport has released the
    /// previous reply, which can outlive its `done` event. The optimistic
    /// insert stays in place if the send fails for any other reason.
    pub async fn send_message(
        &self,
        text: &str,
        files: &[String],
        source: Option<&str>,
    ) -> Result<MessageId, ClientError> {
        let text = text.trim();
        if text.is_empty() && files.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let streaming = self.transport.mode() == TransportMode::Stream;
        if streaming && !self.store.dispatch(Action::SetLoading(true)) {
            debug!(thread_id = %self.thread_id, "reply in flight, rejecting send");
            return Err(TransportError::Busy.into());
        }
        if streaming && self.transport.is_busy() {
            debug!(thread_id = %self.thread_id, "previous reply still draining, rejecting send");
            self.store.set_loading(false);
            return Err(TransportError::Busy.into());
        }

        let source = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.source.as_str());
        let id = self.store.add_user_message(text, source, files.to_vec());
        if streaming {
            let _ = self.store.dispatch(Action::SetError(None));
        }

        let request = ChatRequest::new(text, self.thread_id.clone(), source).with_files(files);
        match self.transport.send(&request).await {
            Ok(()) => {
                debug!(message_id = %id, thread_id = %self.thread_id, files = files.len(), "message sent");
                Ok(id)
            }
            Err(TransportError::Busy) => {
                debug!(message_id = %id, "transport busy, retracting message");
                let _ = self.store.retract_message(&id);
                self.store.set_loading(false);
                Err(TransportError::Busy.into())
            }
            Err(e) => {
                warn!(message_id = %id, kind = e.kind(), error = %e, "send failed");
                let _ = self.store.dispatch(Action::SetError(Some(e.to_string())));
                self.store.set_loading(false);
                Err(e.into())
            }
        }
    }

    /// Abort the current reply (stream mode) or close the socket.
    pub fn stop(&self) {
        info!(thread_id = %self.thread_id, "stopping");
        self.transport.disconnect();
        self.store.set_loading(false);
    }

    /// Drop every message, thought, tool call, and system note.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        let _ = self.transport.off(self.subscription);
        self.transport.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use parley_core::{ChatEvent, Role};
    use parley_transport::{
        DisconnectReason, Generation, Handler, Subscribers, TransportEvent,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ── Fake transport ──────────────────────────────────────────────────

    struct FakeTransport {
        mode: TransportMode,
        subscribers: Subscribers,
        sent: Mutex<Vec<ChatRequest>>,
        fail_with: Mutex<Option<TransportError>>,
        busy: AtomicBool,
        disconnects: AtomicUsize,
    }

    impl FakeTransport {
        fn new(mode: TransportMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                subscribers: Subscribers::new(),
                sent: Mutex::new(Vec::new()),
                fail_with: Mutex::new(None),
                busy: AtomicBool::new(false),
                disconnects: AtomicUsize::new(0),
            })
        }

        fn push(&self, event: TransportEvent) {
            let _ = self.subscribers.emit(&event);
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn mode(&self) -> TransportMode {
            self.mode
        }

        async fn connect(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&self, request: &ChatRequest) -> Result<(), TransportError> {
            if let Some(e) = self.fail_with.lock().clone() {
                return Err(e);
            }
            self.sent.lock().push(request.clone());
            Ok(())
        }

        fn disconnect(&self) {
            let _ = self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn on(&self, key: &str, handler: Handler) -> SubscriptionId {
            self.subscribers.on(key, handler)
        }

        fn off(&self, id: SubscriptionId) -> bool {
            self.subscribers.off(id)
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn generation(&self) -> Generation {
            Generation::new(1)
        }

        fn is_busy(&self) -> bool {
            self.busy.load(Ordering::SeqCst)
        }
    }

    fn client(mode: TransportMode) -> (ChatClient, Arc<FakeTransport>) {
        let transport = FakeTransport::new(mode);
        let client = ChatClient::new(
            Arc::new(ChatStore::new()),
            Arc::clone(&transport) as Arc<dyn Transport>,
            ThreadId::from("default_session"),
            "user",
        );
        (client, transport)
    }

    // ── Composer ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_inserts_optimistically_and_sets_loading() {
        let (client, transport) = client(TransportMode::Stream);
        let id = client.send_message("  hello  ", &[], None).await.unwrap();

        let state = client.store().snapshot();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].id, id);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[0].content, "hello");
        assert_eq!(state.messages[0].source, "user");
        assert!(state.is_loading);

        let sent = transport.sent.lock();
        assert_eq!(sent[0].message, "hello");
        assert_eq!(sent[0].thread_id, "default_session");
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let (client, transport) = client(TransportMode::Stream);
        assert_matches!(
            client.send_message("   ", &[], None).await,
            Err(ClientError::EmptyMessage)
        );
        assert!(client.store().snapshot().messages.is_empty());
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn attachments_alone_are_enough() {
        let (client, transport) = client(TransportMode::Stream);
        let files = vec!["https://files/a.png".to_owned()];
        let _ = client.send_message("", &files, Some("admin")).await.unwrap();

        let state = client.store().snapshot();
        assert_eq!(state.messages[0].attachments, files);
        assert_eq!(state.messages[0].source, "admin");
        assert!(transport.sent.lock()[0].metadata.contains_key("files"));
    }

    #[tokio::test]
    async fn busy_while_reply_in_flight() {
        let (client, transport) = client(TransportMode::Stream);
        let _ = client.send_message("one", &[], None).await.unwrap();
        assert_matches!(
            client.send_message("two", &[], None).await,
            Err(ClientError::Transport(TransportError::Busy))
        );
        assert_eq!(client.store().snapshot().messages.len(), 1);

        transport.push(TransportEvent::Event(ChatEvent::Done {
            timestamp: Utc::now(),
        }));
        let _ = client.send_message("three", &[], None).await.unwrap();
        assert_eq!(transport.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn draining_reply_keeps_the_composer_closed() {
        let (client, transport) = client(TransportMode::Stream);
        let _ = client.send_message("one", &[], None).await.unwrap();
        transport.push(TransportEvent::Event(ChatEvent::Done {
            timestamp: Utc::now(),
        }));
        transport.busy.store(true, Ordering::SeqCst);

        assert_matches!(
            client.send_message("two", &[], None).await,
            Err(ClientError::Transport(TransportError::Busy))
        );
        let state = client.store().snapshot();
        assert_eq!(state.messages.len(), 1);
        assert!(!state.is_loading);
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn busy_send_retracts_the_optimistic_insert() {
        let (client, transport) = client(TransportMode::Stream);
        *transport.fail_with.lock() = Some(TransportError::Busy);

        assert_matches!(
            client.send_message("hi", &[], None).await,
            Err(ClientError::Transport(TransportError::Busy))
        );
        let state = client.store().snapshot();
        assert!(state.messages.is_empty());
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn socket_mode_does_not_gate() {
        let (client, transport) = client(TransportMode::Socket);
        let _ = client.send_message("one", &[], None).await.unwrap();
        let _ = client.send_message("two", &[], None).await.unwrap();
        assert!(!client.store().is_loading());
        assert_eq!(transport.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_surfaces_error_and_clears_loading() {
        let (client, transport) = client(TransportMode::Stream);
        *transport.fail_with.lock() = Some(TransportError::Request("refused".into()));

        let err = client.send_message("hi", &[], None).await.unwrap_err();
        assert_eq!(err.kind(), "request");

        let state = client.store().snapshot();
        assert_eq!(state.messages.len(), 1);
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("request failed: refused"));
    }

    // ── Bridge wiring ───────────────────────────────────────────────────

    #[tokio::test]
    async fn transport_events_reach_the_store() {
        let (client, transport) = client(TransportMode::Stream);
        let _ = client.send_message("hi", &[], None).await.unwrap();

        transport.push(TransportEvent::Connected {
            generation: Generation::new(1),
        });
        assert!(client.store().snapshot().is_connected);

        transport.push(TransportEvent::Event(ChatEvent::Error {
            timestamp: Utc::now(),
            message: "rate limited".into(),
        }));
        transport.push(TransportEvent::Disconnected {
            generation: Generation::new(1),
            reason: DisconnectReason::StreamEnded,
        });

        let state = client.store().snapshot();
        assert!(!state.is_connected);
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn stop_disconnects_and_clears_loading() {
        let (client, transport) = client(TransportMode::Stream);
        let _ = client.send_message("hi", &[], None).await.unwrap();
        client.stop();
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(!client.store().is_loading());
    }

    #[tokio::test]
    async fn drop_unsubscribes_and_disconnects() {
        let (client, transport) = client(TransportMode::Socket);
        assert_eq!(transport.subscribers.len(), 1);
        drop(client);
        assert!(transport.subscribers.is_empty());
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_resets_state() {
        let (client, _transport) = client(TransportMode::Socket);
        let _ = client.send_message("hi", &[], None).await.unwrap();
        client.clear();
        assert!(client.store().snapshot().is_empty());
    }
}
