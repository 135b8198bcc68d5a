//! Shared state stores consulted by the networking tasks and frontends.

pub mod conversation;
pub mod friends;

pub use conversation::{ConversationStore, RouteOutcome};
pub use friends::FriendLists;
