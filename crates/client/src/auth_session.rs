//! Session store: the authenticated user, bearer token and server URLs.

use std::sync::{Arc, RwLock};

use campusmeet_shared::{http_to_ws, is_local_address, normalize_host, User};

use crate::api_client::ApiClient;

/// An authenticated session. Held in memory only; logging out drops the
/// token.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Cloneable handle to the current session and the configured server host.
///
/// All components consult this single store, so a logout (explicit or
/// forced by a 401) is observed everywhere at once.
#[derive(Clone, Debug)]
pub struct SessionStore {
    session: Arc<RwLock<Option<AuthSession>>>,
    server_host: String,
}

impl SessionStore {
    /// Create a store talking to `server_host` (e.g. `localhost:8000` or
    /// `https://campus.example`).
    pub fn new(server_host: impl AsRef<str>) -> Self {
        Self {
            session: Arc::new(RwLock::new(None)),
            server_host: normalize_host(server_host.as_ref()),
        }
    }

    /// Begin a session for `user` with a backend-issued bearer token.
    pub fn login(&self, user: User, token: String) {
        *self.write() = Some(AuthSession { user, token });
    }

    /// End the session. Callers owning the chat channel and poller are
    /// responsible for tearing those down as well.
    pub fn logout(&self) {
        *self.write() = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.read().as_ref().map(|s| s.user.id)
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    /// Create an API client configured for the current session.
    pub fn client(&self) -> ApiClient {
        ApiClient::new()
            .with_base_url(self.api_base_url())
            .with_token(self.token())
    }

    /// Base URL for API calls, choosing `http` for local development hosts
    /// and `https` otherwise.
    fn api_base_url(&self) -> String {
        if self.server_host.is_empty() {
            return String::new();
        }
        if is_local_address(&self.server_host) {
            format!("http://{}", self.server_host)
        } else {
            format!("https://{}", self.server_host)
        }
    }

    /// Construct an API URL for `path`.
    pub fn api_url(&self, path: &str) -> String {
        let base = self.api_base_url();
        if base.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// Construct a WebSocket URL for `path`.
    pub fn ws_url(&self, path: &str) -> String {
        http_to_ws(&self.api_url(path))
    }

    /// Full chat socket URL for the current session, or `None` when logged
    /// out. The token rides along as a query parameter because browsers
    /// cannot set headers on WebSocket upgrades, and the backend expects
    /// the same everywhere.
    pub fn chat_socket_url(&self) -> Option<String> {
        let (user_id, token) = {
            let guard = self.read();
            let session = guard.as_ref()?;
            (session.user.id, session.token.clone())
        };
        Some(format!(
            "{}?token={}",
            self.ws_url(&format!("/ws/chat/{user_id}")),
            urlencoding::encode(&token)
        ))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<AuthSession>> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<AuthSession>> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }
}
