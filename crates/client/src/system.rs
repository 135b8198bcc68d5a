//! The assembled client core: session, friends, search and chat wired
//! together the way a frontend consumes them.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use campusmeet_shared::{ApiError, ChatMessage, FriendRequest, User};
use tokio::sync::broadcast;

use crate::auth_session::SessionStore;
use crate::chat::ChatChannel;
use crate::events::{report_api_error, ClientEvent, EventBus};
use crate::friends::{FriendDirectory, RequestAction, DEFAULT_POLL_INTERVAL};
use crate::search::UserSearch;
use crate::stores::{ConversationStore, FriendLists};
use crate::ws::{ConnectionState, SendError};

/// Background tasks owned by one authenticated session.
struct SessionTasks {
    channel: Arc<ChatChannel>,
    poller: tokio::task::JoinHandle<()>,
    monitor: tokio::task::JoinHandle<()>,
}

/// The client core. One instance per frontend; all methods take `&self`
/// and the stores hand out snapshots, so it is typically held in an `Arc`.
pub struct ChatSystem {
    session: SessionStore,
    events: EventBus,
    directory: FriendDirectory,
    search: UserSearch,
    conversation: ConversationStore,
    tasks: Mutex<Option<SessionTasks>>,
    poll_interval: Duration,
}

impl ChatSystem {
    /// Create a core talking to `server_host`.
    pub fn new(server_host: impl AsRef<str>) -> Self {
        let session = SessionStore::new(server_host);
        let events = EventBus::default();
        let lists = FriendLists::new();
        Self {
            directory: FriendDirectory::new(session.clone(), lists, events.clone()),
            search: UserSearch::new(session.clone(), events.clone()),
            conversation: ConversationStore::new(),
            session,
            events,
            tasks: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the friends poll period (mainly for tests and demos).
    pub fn with_poll_interval(mut self, period: Duration) -> Self {
        self.poll_interval = period;
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    // --- Session lifecycle ---

    /// Begin an authenticated session: opens the chat socket, starts the
    /// friends poller and issues an initial refresh. Any previous
    /// session's tasks are torn down first.
    pub async fn login(&self, user: User, token: String) {
        self.teardown();
        self.session.login(user.clone(), token);

        let channel = Arc::new(ChatChannel::open(
            self.session.clone(),
            user.id,
            self.conversation.clone(),
            self.events.clone(),
        ));
        let poller = self.directory.spawn_poller(self.poll_interval);

        // A 401 anywhere expires the session; the monitor closes the
        // socket and stops the poller when that happens.
        let mut expiry_rx = self.events.subscribe();
        let monitor_channel = channel.clone();
        let poller_abort = poller.abort_handle();
        let monitor = tokio::spawn(async move {
            loop {
                match expiry_rx.recv().await {
                    Ok(ClientEvent::SessionExpired) => {
                        monitor_channel.shutdown();
                        poller_abort.abort();
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *self.tasks_lock() = Some(SessionTasks {
            channel,
            poller,
            monitor,
        });

        self.directory.refresh().await;
    }

    /// End the session: close the socket, stop polling and clear all
    /// session-scoped state.
    pub fn logout(&self) {
        self.session.logout();
        self.teardown();
        self.directory.lists().clear();
        self.search.clear();
        self.conversation.deselect();
    }

    fn teardown(&self) {
        if let Some(tasks) = self.tasks_lock().take() {
            tasks.channel.shutdown();
            tasks.poller.abort();
            tasks.monitor.abort();
        }
    }

    // --- Friends ---

    pub fn friends(&self) -> Vec<User> {
        self.directory.lists().friends()
    }

    pub fn requests_received(&self) -> Vec<FriendRequest> {
        self.directory.lists().received()
    }

    pub fn requests_sent(&self) -> Vec<FriendRequest> {
        self.directory.lists().sent()
    }

    pub async fn refresh_friends(&self) {
        self.directory.refresh().await;
    }

    /// Send a friend request. On success the lists are re-fetched and any
    /// search results are cleared, mirroring the "found a user, added
    /// them" flow.
    pub async fn send_friend_request(&self, user_id: i64) -> Result<(), ApiError> {
        self.directory.send_request(user_id).await?;
        self.search.clear();
        Ok(())
    }

    pub async fn respond_to_request(
        &self,
        request_id: i64,
        action: RequestAction,
    ) -> Result<(), ApiError> {
        self.directory.respond(request_id, action).await
    }

    // --- Search ---

    pub async fn search_users(&self, query: &str) -> Result<(), ApiError> {
        self.search.search(query).await
    }

    pub fn search_results(&self) -> Vec<User> {
        self.search.results()
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_searching()
    }

    // --- Conversation ---

    /// Select `friend` as the active conversation and load its history in
    /// the background. A response arriving after another selection has
    /// been made is discarded.
    pub fn select_conversation(&self, friend: User) {
        let generation = self.conversation.select(friend.clone());
        let api = self.session.client();
        let session = self.session.clone();
        let events = self.events.clone();
        let conversation = self.conversation.clone();

        tokio::spawn(async move {
            match api
                .get_json::<Vec<ChatMessage>>(&format!("/chat/history/{}", friend.id))
                .await
            {
                Ok(history) => {
                    if !conversation.set_history(generation, history) {
                        tracing::debug!("discarding history for a superseded selection");
                    }
                }
                Err(err) => report_api_error(&session, &events, "load chat history", &err),
            }
        });
    }

    /// Clear the active conversation. The socket stays open.
    pub fn deselect_conversation(&self) {
        self.conversation.deselect();
    }

    /// Snapshot of the active conversation's messages.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.messages()
    }

    /// Send `content` to the active conversation's friend.
    pub fn send_message(&self, content: &str) -> Result<(), SendError> {
        let Some(friend_id) = self.conversation.active_id() else {
            return Err(SendError::NoActiveConversation);
        };
        let guard = self.tasks_lock();
        let Some(tasks) = guard.as_ref() else {
            return Err(SendError::NotConnected);
        };
        tasks.channel.send(friend_id, content)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.tasks_lock()
            .as_ref()
            .map(|t| t.channel.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn tasks_lock(&self) -> MutexGuard<'_, Option<SessionTasks>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ChatSystem {
    fn drop(&mut self) {
        self.teardown();
    }
}
