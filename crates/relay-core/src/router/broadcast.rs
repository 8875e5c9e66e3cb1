//! Broadcast targeting

use crate::connection::ConnectionId;

/// Overrides for the targeting carried by an [`Event`](crate::Event)
///
/// `None` falls back to the event's own rooms or exclusions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// Rooms whose members receive the event; empty means every connection
    pub rooms: Option<Vec<String>>,

    /// Connections that never receive the event
    pub except: Option<Vec<ConnectionId>>,
}

impl BroadcastOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to the members of `rooms`
    #[must_use]
    pub fn to_rooms<I, S>(mut self, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rooms = Some(rooms.into_iter().map(Into::into).collect());
        self
    }

    /// Skip the given connections
    #[must_use]
    pub fn excluding<I, S>(mut self, except: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ConnectionId>,
    {
        self.except = Some(except.into_iter().map(Into::into).collect());
        self
    }
}
