//! Transport notifications → reducer actions.
//!
//! The transport never touches chat state. It hands every notification to
//! the handler built by [`store_handler`], which translates it with
//! [`actions_for`] and dispatches the result on the store.

use std::sync::Arc;

use parley_core::{ChatEvent, ClientError};
use parley_store::{Action, ChatStore};
use parley_transport::{DisconnectReason, Handler, TransportEvent};
use tracing::{debug, info, warn};

/// Reducer actions for one transport notification, in dispatch order.
pub fn actions_for(event: &TransportEvent) -> Vec<Action> {
    match event {
        TransportEvent::Connected { .. } => vec![Action::SetConnected(true)],
        TransportEvent::Disconnected { reason, .. } => {
            let mut actions = vec![Action::SetConnected(false), Action::SetLoading(false)];
            match reason {
                DisconnectReason::Closed | DisconnectReason::StreamEnded => {}
                DisconnectReason::Lost(cause) => {
                    actions.push(Action::SetError(Some(format!("connection lost: {cause}"))));
                }
                DisconnectReason::GaveUp { attempts } => {
                    let error = ClientError::ConnectionLost {
                        attempts: *attempts,
                    };
                    actions.push(Action::SetError(Some(error.to_string())));
                }
            }
            actions
        }
        TransportEvent::Reconnecting { .. } => Vec::new(),
        TransportEvent::Error { message } => vec![Action::SetError(Some(message.clone()))],
        TransportEvent::Event(event) => vec![Action::Remote(event.clone())],
    }
}

/// Subscriber that feeds every transport notification into `store`.
pub fn store_handler(store: Arc<ChatStore>) -> Handler {
    Arc::new(move |event: &TransportEvent| {
        log_notification(event);
        for action in actions_for(event) {
            let _ = store.dispatch(action);
        }
    })
}

fn log_notification(event: &TransportEvent) {
    match event {
        TransportEvent::Event(ChatEvent::System { content, .. }) => {
            info!(target: "parley::system", "{content}");
        }
        TransportEvent::Event(ChatEvent::Error { message, .. }) => {
            let error = ClientError::Application(message.clone());
            warn!(kind = error.kind(), error = %error, "agent reported an error");
        }
        TransportEvent::Reconnecting { attempt, delay } => {
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            debug!(attempt, delay_ms, "reconnect pending");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_transport::Generation;
    use std::time::Duration;

    fn disconnected(reason: DisconnectReason) -> TransportEvent {
        TransportEvent::Disconnected {
            generation: Generation::new(1),
            reason,
        }
    }

    #[test]
    fn connection_flags() {
        assert_eq!(
            actions_for(&TransportEvent::Connected {
                generation: Generation::new(1)
            }),
            vec![Action::SetConnected(true)]
        );
        assert_eq!(
            actions_for(&disconnected(DisconnectReason::StreamEnded)),
            vec![Action::SetConnected(false), Action::SetLoading(false)]
        );
    }

    #[test]
    fn lost_and_gave_up_surface_errors() {
        let lost = actions_for(&disconnected(DisconnectReason::Lost("reset".into())));
        assert_eq!(
            lost.last(),
            Some(&Action::SetError(Some("connection lost: reset".into())))
        );

        let gave_up = actions_for(&disconnected(DisconnectReason::GaveUp { attempts: 5 }));
        assert_eq!(
            gave_up.last(),
            Some(&Action::SetError(Some(
                "connection lost after 5 reconnect attempts".into()
            )))
        );
    }

    #[test]
    fn reconnecting_changes_nothing() {
        let event = TransportEvent::Reconnecting {
            attempt: 2,
            delay: Duration::from_secs(2),
        };
        assert!(actions_for(&event).is_empty());
    }

    #[test]
    fn handler_applies_remote_events() {
        let store = Arc::new(ChatStore::new());
        let handler = store_handler(Arc::clone(&store));

        handler(&TransportEvent::Connected {
            generation: Generation::new(1),
        });
        handler(&TransportEvent::Event(ChatEvent::System {
            timestamp: Utc::now(),
            content: "agent restarted".into(),
        }));
        handler(&TransportEvent::Error {
            message: "request failed: refused".into(),
        });

        let state = store.snapshot();
        assert!(state.is_connected);
        assert_eq!(state.system_log.len(), 1);
        assert!(state.messages.is_empty());
        assert_eq!(state.error.as_deref(), Some("request failed: refused"));
    }
}
