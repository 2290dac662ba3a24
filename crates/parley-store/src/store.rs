//! Explicitly owned state container.
//!
//! A [`ChatStore`] is created by whoever composes the application and passed
//! by reference to the parts that read or dispatch. Every mutation goes
//! through [`ChatStore::dispatch`], which runs the reducer under the watch
//! channel's write lock, so dispatches from the transport task and from the
//! UI are serialized and applied in call order. Dropping the store closes the
//! channel; subscribers then see `changed()` return an error and stop.

use parley_core::MessageId;
use tokio::sync::watch;

use crate::reducer::{Action, reduce, user_message};
use crate::state::ChatState;

/// Single-writer chat state with change notification.
#[derive(Debug)]
pub struct ChatStore {
    state: watch::Sender<ChatState>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self { state }
    }

    /// Apply `action`. Subscribers are notified only if the state changed.
    pub fn dispatch(&self, action: Action) -> bool {
        self.state.send_if_modified(|state| reduce(state, action))
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Read the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Receiver that wakes on every change.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state.receiver_count()
    }

    // ── convenience dispatchers ─────────────────────────────────────────

    /// Optimistically insert a locally composed message and return its ID.
    pub fn add_user_message(
        &self,
        text: impl Into<String>,
        source: impl Into<String>,
        attachments: Vec<String>,
    ) -> MessageId {
        let message = user_message(text, source, attachments);
        let id = message.id.clone();
        let _ = self.dispatch(Action::AddUserMessage(message));
        id
    }

    /// Remove an optimistic insert. Returns whether it was still present.
    pub fn retract_message(&self, id: &MessageId) -> bool {
        self.dispatch(Action::RetractMessage(id.clone()))
    }

    /// Reset collections, system log, error, and loading.
    pub fn clear(&self) {
        let _ = self.dispatch(Action::Clear);
    }

    /// Record the transport's connection state.
    pub fn set_connected(&self, connected: bool) {
        let _ = self.dispatch(Action::SetConnected(connected));
    }

    /// Record whether a reply is in flight.
    pub fn set_loading(&self, loading: bool) {
        let _ = self.dispatch(Action::SetLoading(loading));
    }

    /// Whether a reply is in flight.
    pub fn is_loading(&self) -> bool {
        self.read(|s| s.is_loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn dispatch_updates_snapshot() {
        let store = ChatStore::new();
        let id = store.add_user_message("hello", "user", Vec::new());
        let snapshot = store.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].id, id);
    }

    #[test]
    fn subscribers_see_only_real_changes() {
        let store = ChatStore::new();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.set_loading(false);
        assert!(!rx.has_changed().unwrap());

        store.set_loading(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_loading);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn clear_notifies() {
        let store = ChatStore::new();
        let _ = store.add_user_message("x", "user", Vec::new());
        let mut rx = store.subscribe();
        store.clear();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn subscriber_wakes_on_change() {
        let store = Arc::new(ChatStore::new());
        let mut rx = store.subscribe();

        let writer = Arc::clone(&store);
        let task = tokio::spawn(async move {
            writer.set_connected(true);
        });

        rx.changed().await.unwrap();
        assert!(rx.borrow().is_connected);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_store_ends_subscriptions() {
        let store = ChatStore::new();
        let mut rx = store.subscribe();
        assert_eq!(store.subscriber_count(), 1);
        drop(store);
        assert!(rx.changed().await.is_err());
    }

    #[test]
    fn concurrent_dispatch_is_serialized() {
        let store = Arc::new(ChatStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let _ = store.add_user_message(format!("{t}-{i}"), "user", Vec::new());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.read(|s| s.messages.len()), 200);
    }
}
