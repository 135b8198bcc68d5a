//! The chat channel: one live socket per session, routed through the
//! active-conversation cell.

use campusmeet_shared::{ChatMessage, OutboundMessage};

use crate::auth_session::SessionStore;
use crate::events::{ClientEvent, EventBus};
use crate::stores::{ConversationStore, RouteOutcome};
use crate::ws::{ConnectionState, ReconnectConfig, SendError, WsConnection, WsHandle};

/// Owns the session's WebSocket connection and wires inbound traffic to
/// the conversation store and the event bus.
///
/// The message handler is registered once for the connection's lifetime;
/// it consults the live conversation store on every inbound message, so
/// switching conversations never requires re-registering the handler and
/// never misroutes a message to a stale target.
pub struct ChatChannel {
    connection: WsConnection,
    handle: WsHandle,
    state_watcher: tokio::task::JoinHandle<()>,
}

impl ChatChannel {
    /// Open the chat connection for the current session. `user_id` is the
    /// authenticated user; the socket URL is rebuilt from `session` on
    /// every reconnect so a refreshed token is picked up.
    pub fn open(
        session: SessionStore,
        user_id: i64,
        conversation: ConversationStore,
        events: EventBus,
    ) -> Self {
        let url_builder = move || session.chat_socket_url();

        let route_events = events.clone();
        let on_message = move |msg: ChatMessage| {
            match conversation.route_inbound(user_id, msg.clone()) {
                RouteOutcome::Appended => route_events.emit(ClientEvent::MessageReceived(msg)),
                RouteOutcome::Duplicate => {
                    tracing::debug!(message_id = msg.id, "duplicate delivery ignored")
                }
                RouteOutcome::NotActive => route_events.emit(ClientEvent::MessageElsewhere(msg)),
            }
        };

        let connection = WsConnection::new(url_builder, on_message, ReconnectConfig::default());
        let handle = connection.handle();

        let mut state_rx = connection.subscribe_state();
        let state_watcher = tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = state_rx.borrow_and_update().clone();
                events.emit(ClientEvent::Connection(state));
            }
        });

        Self {
            connection,
            handle,
            state_watcher,
        }
    }

    /// Handle for sending without holding the channel.
    pub fn handle(&self) -> WsHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state_now()
    }

    /// Send `content` to `receiver_id`. Empty content and a closed
    /// connection are both reported to the caller, never dropped silently.
    pub fn send(&self, receiver_id: i64, content: &str) -> Result<(), SendError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SendError::EmptyContent);
        }
        self.handle.send(OutboundMessage {
            receiver_id,
            content: content.to_string(),
        })
    }

    /// Close the socket and stop the background tasks.
    pub fn shutdown(&self) {
        self.connection.shutdown();
        self.state_watcher.abort();
    }
}

impl Drop for ChatChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
