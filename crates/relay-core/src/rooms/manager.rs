//! Room manager
//!
//! Many-to-many membership between connection ids and room names. Both directions
//! live behind a single lock so a connection is never half-removed.

use crate::connection::ConnectionId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Memberships {
    /// Room name to member ids
    rooms: HashMap<String, HashSet<ConnectionId>>,

    /// Connection id to joined rooms
    by_connection: HashMap<ConnectionId, HashSet<String>>,
}

/// Tracks which connections are in which rooms
///
/// Unknown rooms and connections read as empty, never as errors. Rooms exist only
/// while they have members.
#[derive(Default)]
pub struct RoomManager {
    memberships: RwLock<Memberships>,
}

impl RoomManager {
    /// Create an empty room manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room
    ///
    /// Returns `false` if it already was a member.
    pub fn add_to_room(&self, connection_id: &str, room: &str) -> bool {
        self.add_to_room_if(connection_id, room, || true)
    }

    /// Add a connection to a room if `is_live` still holds
    ///
    /// `is_live` runs under the membership lock, so it is ordered against
    /// [`remove_connection_from_all_rooms`](Self::remove_connection_from_all_rooms):
    /// once a connection is unregistered and swept it cannot be added back.
    pub fn add_to_room_if<F>(&self, connection_id: &str, room: &str, is_live: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut guard = self.memberships.write();
        if !is_live() {
            tracing::debug!(connection_id, room, "Refusing room join for a closed connection");
            return false;
        }
        let added = guard
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string());
        guard
            .by_connection
            .entry(connection_id.to_string())
            .or_default()
            .insert(room.to_string());

        if added {
            tracing::debug!(connection_id, room, "Joined room");
        }
        added
    }

    /// Remove a connection from a room
    ///
    /// Returns `false` if it was not a member.
    pub fn remove_from_room(&self, connection_id: &str, room: &str) -> bool {
        let mut guard = self.memberships.write();
        let Memberships {
            rooms,
            by_connection,
        } = &mut *guard;

        let removed = detach(rooms, room, connection_id);
        detach(by_connection, connection_id, room);

        if removed {
            tracing::debug!(connection_id, room, "Left room");
        }
        removed
    }

    /// Remove a connection from every room it joined
    ///
    /// Returns the rooms it left.
    pub fn remove_connection_from_all_rooms(&self, connection_id: &str) -> Vec<String> {
        let mut guard = self.memberships.write();
        let Memberships {
            rooms,
            by_connection,
        } = &mut *guard;

        let Some(joined) = by_connection.remove(connection_id) else {
            return Vec::new();
        };
        for room in &joined {
            detach(rooms, room, connection_id);
        }

        let mut left: Vec<String> = joined.into_iter().collect();
        left.sort();
        tracing::debug!(connection_id, rooms = ?left, "Left all rooms");
        left
    }

    /// Members of a room; empty for an unknown room
    pub fn get_connections_in_room(&self, room: &str) -> HashSet<ConnectionId> {
        self.memberships
            .read()
            .rooms
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    /// Union of the members of several rooms
    pub fn connections_in_rooms<S: AsRef<str>>(&self, rooms: &[S]) -> HashSet<ConnectionId> {
        let guard = self.memberships.read();
        rooms
            .iter()
            .filter_map(|room| guard.rooms.get(room.as_ref()))
            .flatten()
            .cloned()
            .collect()
    }

    /// Rooms a connection joined
    pub fn get_rooms_for_connection(&self, connection_id: &str) -> HashSet<String> {
        self.memberships
            .read()
            .by_connection
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Check room membership
    pub fn is_in_room(&self, connection_id: &str, room: &str) -> bool {
        self.memberships
            .read()
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(connection_id))
    }

    /// Names of all non-empty rooms, sorted
    pub fn get_all_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.memberships.read().rooms.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Number of members in a room
    pub fn get_room_count(&self, room: &str) -> usize {
        self.memberships.read().rooms.get(room).map_or(0, HashSet::len)
    }
}

/// Remove `value` from the set under `key`, dropping the set once empty
fn detach(map: &mut HashMap<String, HashSet<String>>, key: &str, value: &str) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}

impl std::fmt::Debug for RoomManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.memberships.read();
        f.debug_struct("RoomManager")
            .field("rooms", &guard.rooms.len())
            .field("connections", &guard.by_connection.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let rooms = RoomManager::new();

        assert!(rooms.add_to_room("c1", "lobby"));
        assert!(!rooms.add_to_room("c1", "lobby"));
        assert_eq!(rooms.get_room_count("lobby"), 1);

        assert!(rooms.remove_from_room("c1", "lobby"));
        assert!(!rooms.remove_from_room("c1", "lobby"));
        assert!(!rooms.remove_from_room("c9", "nowhere"));
        assert!(rooms.get_all_rooms().is_empty());
    }

    #[test]
    fn test_unknown_room_is_empty() {
        let rooms = RoomManager::new();
        assert!(rooms.get_connections_in_room("ghost").is_empty());
        assert_eq!(rooms.get_room_count("ghost"), 0);
        assert!(!rooms.is_in_room("c1", "ghost"));
    }

    #[test]
    fn test_remove_connection_from_all_rooms() {
        let rooms = RoomManager::new();
        rooms.add_to_room("c1", "lobby");
        rooms.add_to_room("c1", "games");
        rooms.add_to_room("c2", "lobby");

        assert_eq!(rooms.remove_connection_from_all_rooms("c1"), vec!["games", "lobby"]);

        assert!(rooms.get_rooms_for_connection("c1").is_empty());
        assert!(!rooms.is_in_room("c1", "lobby"));
        assert_eq!(rooms.get_all_rooms(), vec!["lobby"]);
        assert!(rooms.remove_connection_from_all_rooms("c1").is_empty());
    }

    #[test]
    fn test_conditional_join_after_sweep() {
        let rooms = RoomManager::new();
        let live = std::sync::atomic::AtomicBool::new(true);
        let is_live = || live.load(std::sync::atomic::Ordering::SeqCst);

        assert!(rooms.add_to_room_if("c1", "lobby", is_live));

        live.store(false, std::sync::atomic::Ordering::SeqCst);
        rooms.remove_connection_from_all_rooms("c1");

        assert!(!rooms.add_to_room_if("c1", "lobby", is_live));
        assert!(rooms.get_rooms_for_connection("c1").is_empty());
        assert_eq!(rooms.get_room_count("lobby"), 0);
    }

    #[test]
    fn test_membership_views_agree() {
        let rooms = RoomManager::new();
        rooms.add_to_room("c1", "a");
        rooms.add_to_room("c2", "a");
        rooms.add_to_room("c2", "b");

        assert_eq!(
            rooms.get_rooms_for_connection("c2"),
            HashSet::from(["a".to_string(), "b".to_string()])
        );
        assert!(rooms.is_in_room("c1", "a"));
        assert!(!rooms.is_in_room("c1", "b"));

        let union = rooms.connections_in_rooms(&["a", "b", "missing"]);
        assert_eq!(union, HashSet::from(["c1".to_string(), "c2".to_string()]));
    }
}
