//! Campusmeet client core.
//!
//! Headless state and networking for a campusmeet frontend: the session
//! store, friend directory, user search and the realtime chat channel.
//! Rendering is out of scope; frontends subscribe to the [`EventBus`] and
//! read snapshots from the stores.

pub mod api_client;
pub mod auth_session;
pub mod chat;
pub mod events;
pub mod friends;
pub mod search;
pub mod stores;
pub mod system;
pub mod ws;

pub use api_client::ApiClient;
pub use auth_session::{AuthSession, SessionStore};
pub use chat::ChatChannel;
pub use events::{ClientEvent, EventBus, NoticeLevel};
pub use friends::{FriendDirectory, RequestAction};
pub use search::UserSearch;
pub use stores::{ConversationStore, FriendLists, RouteOutcome};
pub use system::ChatSystem;
pub use ws::{ConnectionState, ReconnectConfig, SendError, WsConnection, WsHandle};
