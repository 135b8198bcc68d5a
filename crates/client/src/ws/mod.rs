//! WebSocket connection with state management and auto-reconnect.

use campusmeet_shared::OutboundMessage;
use futures_channel::mpsc::UnboundedSender;
use thiserror::Error;
use tokio::sync::watch;

mod connection;
pub use connection::WsConnection;

/// Connection state for the chat socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite).
    pub max_attempts: u32,
    /// Initial delay in milliseconds.
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate the delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }
}

/// Why an outbound message was not sent. Sends never fail silently.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("no active conversation")]
    NoActiveConversation,
    #[error("chat connection is not open")]
    NotConnected,
    #[error("chat connection task has stopped")]
    ChannelClosed,
    #[error("message content is empty")]
    EmptyContent,
}

/// Handle for sending messages through a live connection.
#[derive(Clone)]
pub struct WsHandle {
    sender: UnboundedSender<OutboundMessage>,
    state: watch::Receiver<ConnectionState>,
}

impl WsHandle {
    pub(crate) fn new(
        sender: UnboundedSender<OutboundMessage>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { sender, state }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_connected()
    }

    /// Queue an outbound message. Fails when the connection is not open so
    /// the caller always sees a dropped send.
    pub fn send(&self, msg: OutboundMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotConnected);
        }
        self.sender
            .unbounded_send(msg)
            .map_err(|_| SendError::ChannelClosed)
    }
}
