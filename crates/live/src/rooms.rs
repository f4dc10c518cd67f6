//! Server rooms the client has joined.
//!
//! Membership is advisory: it only records which `join_server_room` hints
//! were sent so they can be repeated after a reconnect. Nothing is enforced
//! locally.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct RoomMembership {
    rooms: RwLock<BTreeSet<String>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a joined room. Returns `false` if it was already recorded.
    pub fn insert(&self, server_id: &str) -> bool {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server_id.to_string())
    }

    /// Forgets a room. Returns `false` if it was not recorded.
    pub fn remove(&self, server_id: &str) -> bool {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id)
    }

    pub fn contains(&self, server_id: &str) -> bool {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(server_id)
    }

    /// Joined rooms in sorted order.
    pub fn snapshot(&self) -> Vec<String> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.rooms.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
