//! Connection management loop built on tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use campusmeet_shared::{ChatMessage, OutboundMessage};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{ConnectionState, ReconnectConfig, WsHandle};

/// A managed WebSocket connection to the chat endpoint.
///
/// The connection lives in a background task: it dials, splits into read
/// and write halves, and reconnects with exponential backoff until either
/// the attempt budget runs out or [`shutdown`](WsConnection::shutdown) is
/// called.
pub struct WsConnection {
    state: watch::Receiver<ConnectionState>,
    sender: UnboundedSender<OutboundMessage>,
    shutdown: watch::Sender<bool>,
}

impl WsConnection {
    /// Start a connection. `url_builder` is called on every (re)connect
    /// attempt and returns `None` while no session exists; `on_message`
    /// receives every well-formed inbound [`ChatMessage`].
    pub fn new(
        url_builder: impl Fn() -> Option<String> + Send + Sync + 'static,
        on_message: impl Fn(ChatMessage) + Send + Sync + 'static,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (sender, receiver) = unbounded();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        start_connection_loop(
            state_tx,
            receiver,
            Arc::new(url_builder),
            Arc::new(on_message),
            reconnect,
            shutdown_rx,
        );

        Self {
            state: state_rx,
            sender,
            shutdown: shutdown_tx,
        }
    }

    /// Get a handle for sending messages.
    pub fn handle(&self) -> WsHandle {
        WsHandle::new(self.sender.clone(), self.state.clone())
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Current connection state.
    pub fn state_now(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Close the socket and stop the connection task. Terminal; a new
    /// connection requires a new `WsConnection`.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn start_connection_loop(
    state: watch::Sender<ConnectionState>,
    receiver: UnboundedReceiver<OutboundMessage>,
    url_builder: Arc<dyn Fn() -> Option<String> + Send + Sync>,
    on_message: Arc<dyn Fn(ChatMessage) + Send + Sync>,
    reconnect: ReconnectConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        // The write task takes the receiver for the lifetime of one
        // connection and hands it back through the mutex on reconnect.
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut attempt = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(url) = url_builder() else {
                // Not authenticated yet; idle until that changes. Receivers
                // are only woken when the state actually moves.
                set_disconnected(&state);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(1000)) => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            };

            if attempt == 0 {
                state.send_replace(ConnectionState::Connecting);
            } else {
                state.send_replace(ConnectionState::Reconnecting { attempt });
            }

            match connect_async(url.as_str()).await {
                Ok((ws_stream, _response)) => {
                    state.send_replace(ConnectionState::Connected);
                    attempt = 0;
                    tracing::info!("chat socket connected");

                    let (mut write, mut read) = ws_stream.split();

                    // Either half finishing means the connection is done.
                    let (close_tx, mut close_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

                    let on_message_for_read = on_message.clone();
                    let close_tx_for_read = close_tx.clone();
                    let read_task = tokio::spawn(async move {
                        while let Some(frame) = read.next().await {
                            match frame {
                                Ok(Message::Text(text)) => {
                                    match serde_json::from_str::<ChatMessage>(text.as_str()) {
                                        Ok(msg) => on_message_for_read(msg),
                                        Err(e) => {
                                            tracing::warn!("dropping malformed chat frame: {e}")
                                        }
                                    }
                                }
                                Ok(Message::Close(_)) => break,
                                Ok(Message::Ping(_)) => {
                                    // Pong is handled by tungstenite.
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    tracing::error!("chat socket read error: {e}");
                                    break;
                                }
                            }
                        }
                        let _ = close_tx_for_read.send(());
                    });

                    let receiver_for_write = receiver.clone();
                    let mut shutdown_for_write = shutdown.clone();
                    let write_task = tokio::spawn(async move {
                        let mut rx = receiver_for_write.lock().await;
                        loop {
                            let msg = tokio::select! {
                                m = rx.next() => m,
                                _ = shutdown_for_write.changed() => {
                                    let _ = write.send(Message::Close(None)).await;
                                    break;
                                }
                            };
                            match msg {
                                Some(out) => match serde_json::to_string(&out) {
                                    Ok(json) => {
                                        if let Err(e) = write.send(Message::Text(json.into())).await
                                        {
                                            tracing::error!("chat socket send failed: {e}");
                                            break;
                                        }
                                    }
                                    Err(e) => tracing::error!("serialize failed: {e}"),
                                },
                                None => break,
                            }
                        }
                        let _ = close_tx.send(());
                    });

                    tokio::select! {
                        _ = close_rx.recv() => {}
                        _ = shutdown.changed() => {
                            // Give the write task a moment to send a close
                            // frame before tearing down.
                            let _ = tokio::time::timeout(
                                Duration::from_millis(200),
                                close_rx.recv(),
                            )
                            .await;
                        }
                    }
                    read_task.abort();
                    write_task.abort();
                    state.send_replace(ConnectionState::Disconnected);

                    if *shutdown.borrow() {
                        break;
                    }
                    tracing::info!("chat socket closed, reconnecting");
                }
                Err(e) => {
                    tracing::error!("chat socket connect error: {e}");

                    if reconnect.max_attempts > 0 && attempt >= reconnect.max_attempts {
                        state.send_replace(ConnectionState::Failed {
                            reason: format!(
                                "max reconnect attempts ({}) exceeded",
                                reconnect.max_attempts
                            ),
                        });
                        break;
                    }

                    let delay = reconnect.delay_for_attempt(attempt);
                    tracing::info!("retrying chat socket in {delay}ms (attempt {})", attempt + 1);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(delay as u64)) => {}
                        _ = shutdown.changed() => break,
                    }
                    attempt += 1;
                }
            }
        }

        // Failed is terminal and must stay observable after the task exits.
        if !matches!(*state.borrow(), ConnectionState::Failed { .. }) {
            set_disconnected(&state);
        }
    });
}

fn set_disconnected(state: &watch::Sender<ConnectionState>) {
    state.send_if_modified(|s| {
        if matches!(s, ConnectionState::Disconnected) {
            false
        } else {
            *s = ConnectionState::Disconnected;
            true
        }
    });
}
