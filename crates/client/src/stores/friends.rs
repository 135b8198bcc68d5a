//! Shared friend-directory lists.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use campusmeet_shared::{FriendRequest, User};

#[derive(Debug, Default)]
struct Lists {
    friends: Vec<User>,
    received: Vec<FriendRequest>,
    sent: Vec<FriendRequest>,
}

/// Cloneable handle to the three friend lists.
///
/// Each list updates independently: a failed fetch leaves the previous
/// value in place while the others move on.
#[derive(Clone, Debug, Default)]
pub struct FriendLists {
    inner: Arc<RwLock<Lists>>,
}

impl FriendLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn friends(&self) -> Vec<User> {
        self.read().friends.clone()
    }

    pub fn received(&self) -> Vec<FriendRequest> {
        self.read().received.clone()
    }

    pub fn sent(&self) -> Vec<FriendRequest> {
        self.read().sent.clone()
    }

    pub(crate) fn set_friends(&self, friends: Vec<User>) {
        self.write().friends = friends;
    }

    pub(crate) fn set_received(&self, received: Vec<FriendRequest>) {
        self.write().received = received;
    }

    pub(crate) fn set_sent(&self, sent: Vec<FriendRequest>) {
        self.write().sent = sent;
    }

    /// Drop everything; used during logout.
    pub(crate) fn clear(&self) {
        let mut lists = self.write();
        lists.friends.clear();
        lists.received.clear();
        lists.sent.clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Lists> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lists> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
