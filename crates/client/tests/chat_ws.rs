//! Chat channel flows against a mock WebSocket server.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use campusmeet_client::{
    ChatChannel, ClientEvent, ConnectionState, ConversationStore, EventBus, ReconnectConfig,
    SendError, SessionStore, WsConnection,
};
use campusmeet_shared::User;

fn user(id: i64, username: &str) -> User {
    User {
        id,
        username: username.to_string(),
        email: format!("{username}@campus.example"),
        first_name: None,
        last_name: None,
        interests: None,
    }
}

fn chat_frame(id: i64, sender_id: i64, receiver_id: i64, content: &str) -> String {
    json!({
        "id": id,
        "sender_id": sender_id,
        "receiver_id": receiver_id,
        "content": content,
        "timestamp": "2026-08-30T12:00:00Z",
    })
    .to_string()
}

/// One accepted client socket, seen from the server side.
struct WsPeer {
    /// Text frames to push to the client.
    outbound: mpsc::UnboundedSender<String>,
    /// Text frames the client sent.
    inbound: mpsc::UnboundedReceiver<String>,
}

/// Accepts WebSocket connections and hands each one back as a [`WsPeer`].
async fn spawn_ws_server() -> (SocketAddr, mpsc::UnboundedReceiver<WsPeer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ws server");
    let addr = listener.local_addr().expect("local addr");
    let (peer_tx, peer_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };
            let (mut write, mut read) = ws.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

            tokio::spawn(async move {
                while let Some(text) = out_rx.recv().await {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // Peer dropped; close the socket under the client.
                let _ = write.send(Message::Close(None)).await;
            });
            tokio::spawn(async move {
                while let Some(Ok(frame)) = read.next().await {
                    if let Message::Text(text) = frame {
                        let _ = in_tx.send(text.as_str().to_string());
                    }
                }
            });

            if peer_tx
                .send(WsPeer {
                    outbound: out_tx,
                    inbound: in_rx,
                })
                .is_err()
            {
                break;
            }
        }
    });

    (addr, peer_rx)
}

fn channel_for(
    addr: SocketAddr,
) -> (
    ChatChannel,
    ConversationStore,
    broadcast::Receiver<ClientEvent>,
) {
    let session = SessionStore::new(format!("127.0.0.1:{}", addr.port()));
    session.login(user(1, "me"), "test-token".to_string());
    let conversation = ConversationStore::new();
    let events = EventBus::default();
    // Subscribe before opening so no connection transition is missed.
    let rx = events.subscribe();
    let channel = ChatChannel::open(session, 1, conversation.clone(), events);
    (channel, conversation, rx)
}

async fn next_event(rx: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

async fn wait_connected(rx: &mut broadcast::Receiver<ClientEvent>) {
    loop {
        if let ClientEvent::Connection(ConnectionState::Connected) = next_event(rx).await {
            return;
        }
    }
}

async fn accept_peer(peers: &mut mpsc::UnboundedReceiver<WsPeer>) -> WsPeer {
    timeout(Duration::from_secs(2), peers.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("server stopped")
}

#[tokio::test]
async fn duplicate_deliveries_are_appended_once() {
    let (addr, mut peers) = spawn_ws_server().await;
    let (_channel, conversation, mut rx) = channel_for(addr);
    let peer = accept_peer(&mut peers).await;
    wait_connected(&mut rx).await;

    conversation.select(user(2, "bob"));

    // The same message delivered twice, then a distinct one as a fence.
    peer.outbound.send(chat_frame(7, 2, 1, "hi")).unwrap();
    peer.outbound.send(chat_frame(7, 2, 1, "hi")).unwrap();
    peer.outbound.send(chat_frame(8, 2, 1, "again")).unwrap();

    match next_event(&mut rx).await {
        ClientEvent::MessageReceived(msg) => assert_eq!(msg.id, 7),
        other => panic!("expected first delivery, got {other:?}"),
    }
    // The duplicate produced no event; the fence arrives next.
    match next_event(&mut rx).await {
        ClientEvent::MessageReceived(msg) => assert_eq!(msg.id, 8),
        other => panic!("expected fence message, got {other:?}"),
    }

    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, 7);
    assert_eq!(messages[1].id, 8);
}

#[tokio::test]
async fn messages_for_other_conversations_are_not_appended() {
    let (addr, mut peers) = spawn_ws_server().await;
    let (_channel, conversation, mut rx) = channel_for(addr);
    let peer = accept_peer(&mut peers).await;
    wait_connected(&mut rx).await;

    conversation.select(user(2, "bob"));

    // From a user who is not the active friend, then one from the friend.
    peer.outbound.send(chat_frame(20, 3, 1, "psst")).unwrap();
    peer.outbound.send(chat_frame(21, 2, 1, "hello")).unwrap();

    match next_event(&mut rx).await {
        ClientEvent::MessageElsewhere(msg) => assert_eq!(msg.sender_id, 3),
        other => panic!("expected an elsewhere notification, got {other:?}"),
    }
    match next_event(&mut rx).await {
        ClientEvent::MessageReceived(msg) => assert_eq!(msg.id, 21),
        other => panic!("expected the active-friend message, got {other:?}"),
    }

    let messages = conversation.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, 21);
}

#[tokio::test]
async fn outbound_messages_reach_the_server_as_json() {
    let (addr, mut peers) = spawn_ws_server().await;
    let (channel, _conversation, mut rx) = channel_for(addr);
    let mut peer = accept_peer(&mut peers).await;
    wait_connected(&mut rx).await;

    channel.send(2, "  hello there  ").expect("send");

    let raw = timeout(Duration::from_secs(2), peer.inbound.recv())
        .await
        .expect("timed out waiting for the frame")
        .expect("peer closed");
    let frame: Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(frame["receiver_id"], 2);
    assert_eq!(frame["content"], "hello there");

    assert_eq!(channel.send(2, "   "), Err(SendError::EmptyContent));
}

#[tokio::test]
async fn send_fails_loudly_while_not_connected() {
    // Nothing is listening on this address, so the channel never connects.
    let session = SessionStore::new("127.0.0.1:1");
    session.login(user(1, "me"), "test-token".to_string());
    let channel = ChatChannel::open(session, 1, ConversationStore::new(), EventBus::default());

    assert_eq!(channel.send(2, "hello"), Err(SendError::NotConnected));
    assert!(!channel.state().is_connected());
}

#[tokio::test]
async fn connection_state_is_published_on_the_bus() {
    let (addr, mut peers) = spawn_ws_server().await;
    let (channel, _conversation, mut rx) = channel_for(addr);
    let _peer = accept_peer(&mut peers).await;

    // State changes coalesce, so Connecting may be skipped; nothing other
    // than the handshake transitions should appear on the way up.
    loop {
        match next_event(&mut rx).await {
            ClientEvent::Connection(ConnectionState::Connected) => break,
            ClientEvent::Connection(ConnectionState::Connecting) => {}
            other => panic!("unexpected event before connecting: {other:?}"),
        }
    }
    assert!(channel.state().is_connected());
}

#[tokio::test]
async fn channel_reconnects_after_the_server_drops_the_socket() {
    let (addr, mut peers) = spawn_ws_server().await;
    let (_channel, conversation, mut rx) = channel_for(addr);
    let peer = accept_peer(&mut peers).await;
    wait_connected(&mut rx).await;

    conversation.select(user(2, "bob"));
    peer.outbound.send(chat_frame(1, 2, 1, "before")).unwrap();
    match next_event(&mut rx).await {
        ClientEvent::MessageReceived(msg) => assert_eq!(msg.id, 1),
        other => panic!("expected a delivery on the first socket, got {other:?}"),
    }

    // The server closes the socket; the channel must dial again on its own
    // and keep routing on the new connection.
    drop(peer);
    let peer = accept_peer(&mut peers).await;
    wait_connected(&mut rx).await;

    peer.outbound.send(chat_frame(2, 2, 1, "after")).unwrap();
    match next_event(&mut rx).await {
        ClientEvent::MessageReceived(msg) => assert_eq!(msg.id, 2),
        other => panic!("expected a delivery on the new socket, got {other:?}"),
    }
    assert_eq!(conversation.messages().len(), 2);
}

#[tokio::test]
async fn exhausted_reconnect_budget_settles_in_failed() {
    // Nothing listens here; every attempt fails immediately.
    let connection = WsConnection::new(
        || Some("ws://127.0.0.1:1/ws/chat/1".to_string()),
        |_msg| {},
        ReconnectConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 1.5,
        },
    );

    let mut state_rx = connection.subscribe_state();
    timeout(Duration::from_secs(2), async {
        loop {
            state_rx.changed().await.expect("state channel closed");
            if matches!(
                *state_rx.borrow_and_update(),
                ConnectionState::Failed { .. }
            ) {
                break;
            }
        }
    })
    .await
    .expect("never reached the failed state");

    // Failed is terminal; the exiting task must not overwrite it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        connection.state_now(),
        ConnectionState::Failed { .. }
    ));
}

#[tokio::test]
async fn idle_connection_does_not_republish_disconnected() {
    // No session, so the url builder yields nothing and the task idles.
    let connection = WsConnection::new(|| None, |_msg| {}, ReconnectConfig::default());
    let mut state_rx = connection.subscribe_state();
    assert_eq!(connection.state_now(), ConnectionState::Disconnected);

    // Long enough for the idle loop to come around; the unchanged state
    // must not wake watchers.
    let woke = timeout(Duration::from_millis(1500), state_rx.changed()).await;
    assert!(woke.is_err(), "idle loop republished an unchanged state");
}
