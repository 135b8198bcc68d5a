//! Friend directory: the three lists, their mutations and the freshness
//! poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use campusmeet_shared::{ApiError, FriendRequest, User};

use crate::auth_session::SessionStore;
use crate::events::{report_api_error, ClientEvent, EventBus};
use crate::stores::FriendLists;

/// Default poll period while a friends view is visible.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Accept or reject a received friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Accept,
    Reject,
}

impl RequestAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestAction::Accept => "accept",
            RequestAction::Reject => "reject",
        }
    }
}

/// Keeps the friends, received-requests and sent-requests lists
/// approximately fresh, and performs the mutating calls.
#[derive(Clone)]
pub struct FriendDirectory {
    session: SessionStore,
    lists: FriendLists,
    events: EventBus,
    in_flight: Arc<AtomicBool>,
}

impl FriendDirectory {
    pub fn new(session: SessionStore, lists: FriendLists, events: EventBus) -> Self {
        Self {
            session,
            lists,
            events,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn lists(&self) -> &FriendLists {
        &self.lists
    }

    /// Refresh all three lists. The fetches run concurrently and fail
    /// independently: a list is replaced only by its own successful fetch.
    pub async fn refresh(&self) {
        if !self.session.is_authenticated() {
            return;
        }
        let _guard = InFlight::enter(&self.in_flight);
        let api = self.session.client();

        let (friends, received, sent) = tokio::join!(
            api.get_json::<Vec<User>>("/friends"),
            api.get_json::<Vec<FriendRequest>>("/friends/requests/received"),
            api.get_json::<Vec<FriendRequest>>("/friends/requests/sent"),
        );

        let mut updated = false;
        match friends {
            Ok(list) => {
                self.lists.set_friends(list);
                updated = true;
            }
            Err(err) => report_api_error(&self.session, &self.events, "fetch friends", &err),
        }
        match received {
            Ok(list) => {
                self.lists.set_received(list);
                updated = true;
            }
            Err(err) => {
                report_api_error(&self.session, &self.events, "fetch received requests", &err)
            }
        }
        match sent {
            Ok(list) => {
                self.lists.set_sent(list);
                updated = true;
            }
            Err(err) => report_api_error(&self.session, &self.events, "fetch sent requests", &err),
        }

        if updated {
            self.events.emit(ClientEvent::FriendsUpdated);
        }
    }

    /// Send a friend request to `user_id`. On success every list is
    /// re-fetched; on failure the backend's message is surfaced verbatim
    /// through the notice channel and the error is returned. Self-requests
    /// are not pre-validated; the backend rejects them.
    pub async fn send_request(&self, user_id: i64) -> Result<(), ApiError> {
        let api = self.session.client();
        match api
            .post_empty::<serde_json::Value>(&format!("/friends/request/{user_id}"))
            .await
        {
            Ok(_) => {
                self.refresh().await;
                Ok(())
            }
            Err(err) => {
                report_api_error(&self.session, &self.events, "send friend request", &err);
                Err(err)
            }
        }
    }

    /// Accept or reject a received request. The backend owns the request
    /// state machine, so the lists are re-fetched after every attempt —
    /// including rejected ones, where the re-fetch is what proves local
    /// state unchanged.
    pub async fn respond(&self, request_id: i64, action: RequestAction) -> Result<(), ApiError> {
        let api = self.session.client();
        let result = api
            .post_empty::<serde_json::Value>(&format!(
                "/friends/respond/{request_id}/{}",
                action.as_str()
            ))
            .await;

        match result {
            Ok(_) => {
                self.refresh().await;
                Ok(())
            }
            Err(err) => {
                report_api_error(&self.session, &self.events, "respond to friend request", &err);
                if !err.is_unauthorized() {
                    self.refresh().await;
                }
                Err(err)
            }
        }
    }

    /// Spawn the fixed-interval freshness poller. A tick is skipped while
    /// any refresh (polled or explicit) is still in flight, so requests
    /// never pile up behind a slow backend.
    pub fn spawn_poller(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let directory = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the initial refresh is
            // issued by login, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !directory.session.is_authenticated() {
                    continue;
                }
                if directory.in_flight.load(Ordering::Acquire) {
                    tracing::debug!("skipping friends poll tick, refresh in flight");
                    continue;
                }
                directory.refresh().await;
            }
        })
    }
}

/// RAII marker for the single-flight poll guard.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_actions_map_to_path_segments() {
        assert_eq!(RequestAction::Accept.as_str(), "accept");
        assert_eq!(RequestAction::Reject.as_str(), "reject");
    }

    #[test]
    fn in_flight_guard_resets_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = InFlight::enter(&flag);
            assert!(flag.load(Ordering::Acquire));
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
