//! Broadcastable events

use crate::connection::ConnectionId;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// A named payload with optional room targeting
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    data: Map<String, Value>,
    timestamp: DateTime<Utc>,
    broadcast: bool,
    rooms: Vec<String>,
    except: Vec<ConnectionId>,
}

impl Event {
    /// Create a broadcastable event with an empty payload
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Map::new(),
            timestamp: Utc::now(),
            broadcast: true,
            rooms: Vec::new(),
            except: Vec::new(),
        }
    }

    /// Replace the payload
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Add one payload field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.add_data(key, value);
        self
    }

    /// Target a room
    #[must_use]
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.add_room(room);
        self
    }

    /// Exclude a connection from delivery
    #[must_use]
    pub fn with_exception(mut self, connection_id: impl Into<ConnectionId>) -> Self {
        self.add_exception(connection_id);
        self
    }

    /// Enable or disable broadcasting
    #[must_use]
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn should_broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    pub fn except(&self) -> &[ConnectionId] {
        &self.except
    }

    pub fn set_data(&mut self, data: Map<String, Value>) {
        self.data = data;
    }

    pub fn add_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_broadcast(&mut self, broadcast: bool) {
        self.broadcast = broadcast;
    }

    pub fn set_rooms(&mut self, rooms: Vec<String>) {
        self.rooms = rooms;
    }

    /// Add a target room; duplicates are ignored
    pub fn add_room(&mut self, room: impl Into<String>) {
        let room = room.into();
        if !self.rooms.contains(&room) {
            self.rooms.push(room);
        }
    }

    pub fn set_except(&mut self, except: Vec<ConnectionId>) {
        self.except = except;
    }

    /// Add an excluded connection; duplicates are ignored
    pub fn add_exception(&mut self, connection_id: impl Into<ConnectionId>) {
        let connection_id = connection_id.into();
        if !self.except.contains(&connection_id) {
            self.except.push(connection_id);
        }
    }

    /// Creation time as fractional Unix seconds
    pub fn unix_timestamp(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }

    /// Wire representation sent to broadcast targets
    pub fn to_envelope(&self) -> Value {
        json!({
            "event": self.name,
            "data": self.data,
            "timestamp": self.unix_timestamp(),
            "meta": {
                "broadcast": self.broadcast,
                "rooms": self.rooms,
                "except": self.except,
            }
        })
    }
}
