//! Error types shared across the client core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error envelope returned by the campusmeet backend: `{"message": "..."}`.
///
/// FastAPI's own exception handler uses `{"detail": "..."}` for a few
/// paths, so both keys are accepted when extracting a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Attempt to pull a human-readable message out of an error body so it can
/// be shown to the user verbatim. Prefers `message`, falls back to `detail`.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    if let Some(message) = parsed.message {
        if !message.trim().is_empty() {
            return Some(message);
        }
    }
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    None
}

/// API error type for client-side use.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// True for a 401 from an authenticated endpoint; callers must treat
    /// this as session expiry.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http { status: 401, .. })
    }

    /// The message to surface to the user: the backend's own message
    /// verbatim when the body carries one, otherwise the error itself.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { body, .. } => {
                try_error_message(body).unwrap_or_else(|| self.to_string())
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_key_is_preferred() {
        let body = r#"{"message": "Friend request already pending", "detail": "other"}"#;
        assert_eq!(
            try_error_message(body).as_deref(),
            Some("Friend request already pending")
        );
    }

    #[test]
    fn detail_key_is_a_fallback() {
        assert_eq!(
            try_error_message(r#"{"detail": "Not authenticated"}"#).as_deref(),
            Some("Not authenticated")
        );
        assert_eq!(try_error_message(r#"{"message": "  "}"#), None);
        assert_eq!(try_error_message("not json"), None);
    }

    #[test]
    fn user_message_surfaces_backend_body_verbatim() {
        let err = ApiError::Http {
            status: 400,
            body: r#"{"message": "You are already friends"}"#.to_string(),
        };
        assert_eq!(err.user_message(), "You are already friends");
        assert!(!err.is_unauthorized());

        let unauthorized = ApiError::Http {
            status: 401,
            body: String::new(),
        };
        assert!(unauthorized.is_unauthorized());
    }
}
