//! Data models for the campusmeet backend API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Identity ---

/// A platform user as returned by the backend directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Opaque, stable identifier assigned by the backend.
    pub id: i64,
    /// Unique display handle. Mutable server-side.
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Comma-joined interest tags, owned by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<String>,
}

// --- Friends ---

/// Lifecycle of a friend request. `Pending` is the only non-terminal
/// state; the client never transitions these locally, it asks the backend
/// and re-fetches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A friend request between two users. Backend-authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendRequest {
    pub id: i64,
    pub requester_id: i64,
    pub receiver_id: i64,
    pub status: RequestStatus,
}

// --- Chat ---

/// One chat message. Immutable once created; de-duplicated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// True when this message belongs to the conversation between
    /// `user_id` and `friend_id`, in either direction.
    pub fn is_between(&self, user_id: i64, friend_id: i64) -> bool {
        (self.sender_id == friend_id && self.receiver_id == user_id)
            || (self.sender_id == user_id && self.receiver_id == friend_id)
    }
}

/// Outbound socket payload. The backend assigns id and timestamp and
/// echoes the full [`ChatMessage`] back to both parties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub receiver_id: i64,
    pub content: String,
}
