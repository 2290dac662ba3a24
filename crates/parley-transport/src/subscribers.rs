//! Ordered publish/subscribe registry.
//!
//! Handlers subscribe under an event key ([`TransportEvent::key`]) or the
//! wildcard [`ALL_EVENTS`]. Several handlers may share a key; an event is
//! delivered to every matching handler in subscription order. Handlers are
//! cloned out of the lock before being called, so a handler may subscribe or
//! unsubscribe (itself included) without deadlocking.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::lifecycle::TransportEvent;

/// Wildcard key matching every event.
pub const ALL_EVENTS: &str = "*";

/// Event callback.
pub type Handler = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Handle returned by [`Subscribers::on`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    key: String,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Handler registry.
#[derive(Default)]
pub struct Subscribers {
    inner: Mutex<Registry>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Subscribers")
            .field("count", &inner.entries.len())
            .finish()
    }
}

impl Subscribers {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events with `key`.
    pub fn on(&self, key: impl Into<String>, handler: Handler) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.entries.push(Entry {
            id,
            key: key.into(),
            handler,
        });
        id
    }

    /// Unsubscribe. Returns `false` if `id` was not subscribed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != id);
        inner.entries.len() != before
    }

    /// Deliver `event` to matching handlers. Returns how many were called.
    pub fn emit(&self, event: &TransportEvent) -> usize {
        let key = event.key();
        let handlers: Vec<Handler> = self
            .inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.key == key || e.key == ALL_EVENTS)
            .map(|e| Arc::clone(&e.handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{DisconnectReason, Generation};

    fn connected() -> TransportEvent {
        TransportEvent::Connected {
            generation: Generation::new(1),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Handler {
        let log = Arc::clone(log);
        let tag = tag.to_owned();
        Arc::new(move |event: &TransportEvent| log.lock().push(format!("{tag}:{}", event.key())))
    }

    #[test]
    fn dispatch_follows_subscription_order() {
        let subs = Subscribers::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _ = subs.on("connected", recorder(&log, "a"));
        let _ = subs.on(ALL_EVENTS, recorder(&log, "b"));
        let _ = subs.on("connected", recorder(&log, "c"));

        assert_eq!(subs.emit(&connected()), 3);
        assert_eq!(*log.lock(), vec!["a:connected", "b:connected", "c:connected"]);
    }

    #[test]
    fn only_matching_keys_are_called() {
        let subs = Subscribers::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _ = subs.on("disconnected", recorder(&log, "d"));
        let _ = subs.on("connected", recorder(&log, "c"));

        let _ = subs.emit(&TransportEvent::Disconnected {
            generation: Generation::new(1),
            reason: DisconnectReason::Closed,
        });
        assert_eq!(*log.lock(), vec!["d:disconnected"]);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let subs = Subscribers::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = subs.on("connected", recorder(&log, "a"));
        let _ = subs.on("connected", recorder(&log, "b"));

        assert!(subs.off(a));
        assert!(!subs.off(a));
        let _ = subs.emit(&connected());
        assert_eq!(*log.lock(), vec!["b:connected"]);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let subs = Arc::new(Subscribers::new());
        let calls = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let handler: Handler = {
            let subs = Arc::clone(&subs);
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            Arc::new(move |_event: &TransportEvent| {
                *calls.lock() += 1;
                if let Some(id) = slot.lock().take() {
                    let _ = subs.off(id);
                }
            })
        };
        *slot.lock() = Some(subs.on(ALL_EVENTS, handler));

        let _ = subs.emit(&connected());
        let _ = subs.emit(&connected());
        assert_eq!(*calls.lock(), 1);
        assert!(subs.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let subs = Subscribers::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _ = subs.on(ALL_EVENTS, recorder(&log, "x"));
        subs.clear();
        assert_eq!(subs.emit(&connected()), 0);
        assert!(log.lock().is_empty());
    }
}
