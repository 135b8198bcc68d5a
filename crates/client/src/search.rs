//! Remote user search with out-of-order response protection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use campusmeet_shared::{ApiError, User};

use crate::auth_session::SessionStore;
use crate::events::{report_api_error, ClientEvent, EventBus};

/// Strip whitespace and one leading `@` from a query. Users paste handles
/// as `@alice`; the backend expects `alice`.
pub fn normalize_query(query: &str) -> &str {
    let trimmed = query.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed)
}

#[derive(Debug, Default)]
struct SearchState {
    results: Vec<User>,
    searching: bool,
}

/// Queries the user directory. Responses are sequence-numbered so a slow
/// early response can never overwrite the results of a later query.
#[derive(Clone)]
pub struct UserSearch {
    session: SessionStore,
    events: EventBus,
    seq: Arc<AtomicU64>,
    state: Arc<Mutex<SearchState>>,
}

impl UserSearch {
    pub fn new(session: SessionStore, events: EventBus) -> Self {
        Self {
            session,
            events,
            seq: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(SearchState::default())),
        }
    }

    /// Snapshot of the current results.
    pub fn results(&self) -> Vec<User> {
        self.lock().results.clone()
    }

    /// True while the most recent search is still in flight.
    pub fn is_searching(&self) -> bool {
        self.lock().searching
    }

    /// Clear results immediately and invalidate any in-flight search.
    pub fn clear(&self) {
        self.seq.fetch_add(1, Ordering::AcqRel);
        let mut st = self.lock();
        st.results.clear();
        st.searching = false;
        drop(st);
        self.events.emit(ClientEvent::SearchUpdated);
    }

    /// Run a search. An empty (post-normalization) query clears results
    /// without a network call.
    pub async fn search(&self, query: &str) -> Result<(), ApiError> {
        let query = normalize_query(query);
        if query.is_empty() {
            self.clear();
            return Ok(());
        }

        let seq = self.begin();
        let api = self.session.client();
        let result = api
            .get_json::<Vec<User>>(&format!(
                "/users/search?query={}",
                urlencoding::encode(query)
            ))
            .await;

        match result {
            Ok(users) => {
                if self.apply(seq, users) {
                    self.events.emit(ClientEvent::SearchUpdated);
                }
                Ok(())
            }
            Err(err) => {
                if self.is_current(seq) {
                    self.lock().searching = false;
                    report_api_error(&self.session, &self.events, "search users", &err);
                }
                Err(err)
            }
        }
    }

    fn begin(&self) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.lock().searching = true;
        seq
    }

    fn is_current(&self, seq: u64) -> bool {
        self.seq.load(Ordering::Acquire) == seq
    }

    /// Apply a response for request `seq`. Returns `false` (discarding the
    /// results) when a newer search started while this one was in flight.
    fn apply(&self, seq: u64, users: Vec<User>) -> bool {
        let mut st = self.lock();
        if !self.is_current(seq) {
            tracing::debug!("discarding out-of-order search response");
            return false;
        }
        st.results = users;
        st.searching = false;
        true
    }

    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
