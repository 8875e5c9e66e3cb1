//! Connection registry
//!
//! Tracks live connections by id and by transport key using DashMap for
//! concurrent access.

use super::connection::{Connection, ConnectionId};
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of live connections
#[derive(Default)]
pub struct ConnectionRegistry {
    /// Connections by id
    connections: DashMap<ConnectionId, Arc<Connection>>,

    /// Transport key to connection id
    by_transport_key: DashMap<String, ConnectionId>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    pub fn add(&self, connection: Arc<Connection>) {
        self.by_transport_key
            .insert(connection.transport_key().to_string(), connection.id().to_string());
        tracing::debug!(connection_id = %connection.id(), "Connection added");
        self.connections.insert(connection.id().to_string(), connection);
    }

    /// Remove a connection; removing an unknown id is a no-op
    pub fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(connection_id)?;
        self.by_transport_key
            .remove_if(connection.transport_key(), |_, id| id == connection_id);
        tracing::debug!(connection_id, "Connection removed");
        Some(connection)
    }

    /// Look a connection up by id
    pub fn find_by_id(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|c| Arc::clone(c.value()))
    }

    /// Look a connection up by its transport key
    pub fn find_by_transport_key(&self, key: &str) -> Option<Arc<Connection>> {
        let id = self.by_transport_key.get(key).map(|id| id.value().clone())?;
        self.find_by_id(&id)
    }

    /// Point-in-time snapshot of all connections
    pub fn get_all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|c| Arc::clone(c.value())).collect()
    }

    /// Number of live connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("count", &self.count())
            .finish()
    }
}
