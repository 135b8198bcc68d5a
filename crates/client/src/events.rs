//! Broadcast event bus surfacing core activity to frontends.

use campusmeet_shared::{ApiError, ChatMessage};
use tokio::sync::broadcast;

use crate::auth_session::SessionStore;
use crate::ws::ConnectionState;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Events published by the client core.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The chat connection state changed.
    Connection(ConnectionState),
    /// A message was appended to the active conversation.
    MessageReceived(ChatMessage),
    /// A message arrived for a conversation that is not active. It is not
    /// appended anywhere; frontends may use this to badge unread chats.
    MessageElsewhere(ChatMessage),
    /// One or more friend lists were refreshed.
    FriendsUpdated,
    /// Search results were replaced or cleared.
    SearchUpdated,
    /// A user-facing notice. All recoverable failures arrive here.
    Notice { level: NoticeLevel, text: String },
    /// The backend rejected our credentials; the session has been cleared.
    SessionExpired,
}

/// Cloneable handle to the broadcast bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Dropped silently when nobody is subscribed;
    /// lagging receivers miss events rather than blocking the core.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notice(&self, level: NoticeLevel, text: impl Into<String>) {
        self.emit(ClientEvent::Notice {
            level,
            text: text.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// The single recovery path for API failures: a 401 from any authenticated
/// endpoint expires the session; everything else becomes an error notice
/// carrying the backend's message verbatim.
pub fn report_api_error(session: &SessionStore, events: &EventBus, context: &str, err: &ApiError) {
    if err.is_unauthorized() {
        expire_session(session, events);
        return;
    }
    tracing::warn!("{context} failed: {err}");
    events.notice(NoticeLevel::Error, err.user_message());
}

/// Clear the session and announce expiry. Idempotent.
pub fn expire_session(session: &SessionStore, events: &EventBus) {
    if session.is_authenticated() {
        tracing::warn!("authenticated endpoint returned 401, clearing session");
        session.logout();
        events.emit(ClientEvent::SessionExpired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        bus.emit(ClientEvent::FriendsUpdated);
        bus.notice(NoticeLevel::Info, "hello");
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(ClientEvent::FriendsUpdated);
        bus.notice(NoticeLevel::Error, "boom");

        assert!(matches!(rx.recv().await, Ok(ClientEvent::FriendsUpdated)));
        match rx.recv().await {
            Ok(ClientEvent::Notice { level, text }) => {
                assert_eq!(level, NoticeLevel::Error);
                assert_eq!(text, "boom");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_errors_expire_the_session_once() {
        let session = SessionStore::new("localhost:8000");
        session.login(
            campusmeet_shared::User {
                id: 1,
                username: "a".into(),
                email: "a@campus.example".into(),
                first_name: None,
                last_name: None,
                interests: None,
            },
            "tok".into(),
        );
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let err = ApiError::Http {
            status: 401,
            body: String::new(),
        };
        report_api_error(&session, &bus, "fetch friends", &err);
        report_api_error(&session, &bus, "fetch friends", &err);

        assert!(!session.is_authenticated());
        assert!(matches!(rx.recv().await, Ok(ClientEvent::SessionExpired)));
        // Second report was a no-op.
        assert!(rx.try_recv().is_err());
    }
}
