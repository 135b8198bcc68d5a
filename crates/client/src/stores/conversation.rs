//! Active-conversation state: the single routing target for inbound
//! socket messages and the message list rendered for it.

use std::sync::{Arc, Mutex, MutexGuard};

use campusmeet_shared::{ChatMessage, User};

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Appended to the active conversation.
    Appended,
    /// A message with the same id is already present.
    Duplicate,
    /// Not addressed to the active conversation (or none is active).
    NotActive,
}

#[derive(Debug, Default)]
struct ConversationState {
    active: Option<User>,
    /// Realtime messages in arrival order, history in server order.
    /// Never re-sorted.
    messages: Vec<ChatMessage>,
    /// Bumped on every select/deselect. History responses carry the
    /// generation of the selection that issued them, so a late response
    /// for a superseded selection is discarded.
    generation: u64,
}

/// Cloneable handle to the conversation state.
///
/// There is exactly one authoritative cell per client. The socket's
/// long-lived message handler and the frontend both consult it, so a
/// conversation switch is observed by the handler on the very next
/// inbound message.
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    inner: Arc<Mutex<ConversationState>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `friend` the active conversation. The visible list is cleared
    /// until history arrives so it never shows a previously selected
    /// friend's thread. Returns the generation to pass to
    /// [`set_history`](Self::set_history).
    pub fn select(&self, friend: User) -> u64 {
        let mut st = self.lock();
        st.active = Some(friend);
        st.messages.clear();
        st.generation += 1;
        st.generation
    }

    /// Clear the routing target and the visible list. The socket stays
    /// open; subsequent inbound messages route as [`RouteOutcome::NotActive`].
    pub fn deselect(&self) {
        let mut st = self.lock();
        st.active = None;
        st.messages.clear();
        st.generation += 1;
    }

    pub fn active(&self) -> Option<User> {
        self.lock().active.clone()
    }

    pub fn active_id(&self) -> Option<i64> {
        self.lock().active.as_ref().map(|f| f.id)
    }

    /// Snapshot of the visible message list.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    /// Replace the list with fetched history, in the order the server
    /// returned it. Returns `false` (and changes nothing) when the
    /// selection that issued the fetch has been superseded.
    pub fn set_history(&self, generation: u64, history: Vec<ChatMessage>) -> bool {
        let mut st = self.lock();
        if st.generation != generation {
            return false;
        }
        st.messages = history;
        true
    }

    /// Route one inbound socket message against the live active cell.
    /// Appends at most once per message id.
    pub fn route_inbound(&self, current_user_id: i64, msg: ChatMessage) -> RouteOutcome {
        let mut st = self.lock();
        let Some(active_id) = st.active.as_ref().map(|f| f.id) else {
            return RouteOutcome::NotActive;
        };
        if !msg.is_between(current_user_id, active_id) {
            return RouteOutcome::NotActive;
        }
        if st.messages.iter().any(|m| m.id == msg.id) {
            return RouteOutcome::Duplicate;
        }
        st.messages.push(msg);
        RouteOutcome::Appended
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn friend(id: i64) -> User {
        User {
            id,
            username: format!("friend{id}"),
            email: format!("friend{id}@campus.example"),
            first_name: None,
            last_name: None,
            interests: None,
        }
    }

    fn msg(id: i64, sender_id: i64, receiver_id: i64) -> ChatMessage {
        ChatMessage {
            id,
            sender_id,
            receiver_id,
            content: format!("msg {id}"),
            timestamp: Utc.with_ymd_and_hms(2025, 9, 1, 18, 0, 0).unwrap(),
        }
    }

    #[test]
    fn duplicate_delivery_appends_once() {
        let store = ConversationStore::new();
        store.select(friend(2));

        assert_eq!(store.route_inbound(1, msg(7, 2, 1)), RouteOutcome::Appended);
        assert_eq!(store.route_inbound(1, msg(7, 2, 1)), RouteOutcome::Duplicate);

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 7);
    }

    #[test]
    fn own_outbound_echo_is_routed_too() {
        let store = ConversationStore::new();
        store.select(friend(2));
        // The backend echoes messages the current user sent.
        assert_eq!(store.route_inbound(1, msg(8, 1, 2)), RouteOutcome::Appended);
    }

    #[test]
    fn messages_for_other_conversations_are_not_appended() {
        let store = ConversationStore::new();
        store.select(friend(2));

        assert_eq!(store.route_inbound(1, msg(9, 3, 1)), RouteOutcome::NotActive);
        assert_eq!(store.route_inbound(1, msg(10, 1, 3)), RouteOutcome::NotActive);
        assert!(store.messages().is_empty());
    }

    #[test]
    fn nothing_routes_without_an_active_conversation() {
        let store = ConversationStore::new();
        assert_eq!(store.route_inbound(1, msg(7, 2, 1)), RouteOutcome::NotActive);

        store.select(friend(2));
        store.deselect();
        assert_eq!(store.route_inbound(1, msg(7, 2, 1)), RouteOutcome::NotActive);
    }

    #[test]
    fn stale_history_is_discarded_after_a_switch() {
        let store = ConversationStore::new();
        let first = store.select(friend(2));
        let second = store.select(friend(3));

        // The fetch issued for friend 2 resolves after the switch.
        assert!(!store.set_history(first, vec![msg(1, 2, 1)]));
        assert!(store.messages().is_empty());

        assert!(store.set_history(second, vec![msg(2, 3, 1)]));
        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, 3);
        assert_eq!(store.active_id(), Some(3));
    }

    #[test]
    fn deselect_invalidates_in_flight_history() {
        let store = ConversationStore::new();
        let generation = store.select(friend(2));
        store.deselect();
        assert!(!store.set_history(generation, vec![msg(1, 2, 1)]));
        assert!(store.messages().is_empty());
    }

    #[test]
    fn selection_clears_the_previous_thread_immediately() {
        let store = ConversationStore::new();
        let generation = store.select(friend(2));
        assert!(store.set_history(generation, vec![msg(1, 2, 1), msg(2, 1, 2)]));

        store.select(friend(3));
        assert!(store.messages().is_empty());
    }

    #[test]
    fn realtime_message_may_land_before_history() {
        let store = ConversationStore::new();
        let generation = store.select(friend(2));

        // A socket message beats the history response; the backfill then
        // replaces the list wholesale (it includes everything persisted).
        assert_eq!(store.route_inbound(1, msg(5, 2, 1)), RouteOutcome::Appended);
        assert!(store.set_history(generation, vec![msg(4, 2, 1), msg(5, 2, 1)]));

        let ids: Vec<i64> = store.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 5]);

        // A later duplicate of an id present in history is still dropped.
        assert_eq!(store.route_inbound(1, msg(5, 2, 1)), RouteOutcome::Duplicate);
    }
}
