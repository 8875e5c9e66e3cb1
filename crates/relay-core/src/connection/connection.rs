//! A single connection
//!
//! Wraps the transport handle and the session data handlers attach to it.

use super::transport::{Transport, TransportError};
use crate::protocol::{Codec, OutboundMessage};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Connection identifier, assigned at connect
pub type ConnectionId = String;

/// Session key set once the connection authenticated
pub const AUTHENTICATED_KEY: &str = "authenticated";

/// A connected peer
pub struct Connection {
    /// Unique connection ID
    id: ConnectionId,

    /// Exclusively owned transport handle
    transport: Box<dyn Transport>,

    /// Codec used to encode outbound frames
    codec: RwLock<Arc<dyn Codec>>,

    /// Session data mutated by handlers
    session: RwLock<Map<String, Value>>,

    /// Connection creation time
    created_at: Instant,
}

impl Connection {
    /// Create a connection with a freshly generated id
    pub fn new(transport: Box<dyn Transport>, codec: Arc<dyn Codec>) -> Arc<Self> {
        Self::with_id(format!("client_{}", Uuid::new_v4().simple()), transport, codec)
    }

    /// Create a connection with a known id
    pub fn with_id(id: impl Into<ConnectionId>, transport: Box<dyn Transport>, codec: Arc<dyn Codec>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            transport,
            codec: RwLock::new(codec),
            session: RwLock::new(Map::new()),
            created_at: Instant::now(),
        })
    }

    /// Get the connection ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier the transport uses for this peer
    pub fn transport_key(&self) -> &str {
        self.transport.key()
    }

    /// Replace the outbound codec
    pub fn set_codec(&self, codec: Arc<dyn Codec>) {
        *self.codec.write() = codec;
    }

    /// Encode and send a message
    pub fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.send_value(message)
    }

    /// Encode any serializable value with the connection's codec and send it
    pub fn send_value<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), TransportError> {
        let value = serde_json::to_value(message).map_err(|e| TransportError::Encode(e.to_string()))?;
        let frame = self
            .codec
            .read()
            .encode(&value)
            .map_err(|e| TransportError::Encode(e.0))?;
        self.send_raw(frame)
    }

    /// Send an already encoded frame
    pub fn send_raw(&self, frame: String) -> Result<(), TransportError> {
        let result = self.transport.send(frame);
        if let Err(e) = &result {
            tracing::debug!(connection_id = %self.id, error = %e, "Send failed");
        }
        result
    }

    /// Close the underlying transport
    pub fn close(&self) {
        self.transport.close();
    }

    /// Check if the transport is closed
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Read a session value
    pub fn data(&self, key: &str) -> Option<Value> {
        self.session.read().get(key).cloned()
    }

    /// Store a session value
    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        self.session.write().insert(key.into(), value);
    }

    /// Remove a session value
    pub fn remove_data(&self, key: &str) -> Option<Value> {
        self.session.write().remove(key)
    }

    /// Snapshot of all session data
    pub fn all_data(&self) -> Map<String, Value> {
        self.session.read().clone()
    }

    /// Check if the connection authenticated
    pub fn is_authenticated(&self) -> bool {
        self.session.read().get(AUTHENTICATED_KEY) == Some(&Value::Bool(true))
    }

    /// Get connection age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("transport_key", &self.transport_key())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelTransport, OutboundFrame};
    use crate::protocol::JsonCodec;
    use serde_json::json;

    fn create_test_connection() -> (Arc<Connection>, tokio::sync::mpsc::Receiver<OutboundFrame>) {
        let (transport, rx) = ChannelTransport::new("sock-1", 8);
        (Connection::new(Box::new(transport), Arc::new(JsonCodec)), rx)
    }

    #[test]
    fn test_connection_id_format() {
        let (connection, _rx) = create_test_connection();
        assert!(connection.id().starts_with("client_"));
        assert_eq!(connection.transport_key(), "sock-1");

        let (other, _rx) = create_test_connection();
        assert_ne!(connection.id(), other.id());
    }

    #[test]
    fn test_send_encodes_json() {
        let (connection, mut rx) = create_test_connection();
        connection
            .send(&OutboundMessage::new("greet", json!({"hi": 1})))
            .unwrap();

        let OutboundFrame::Text(frame) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "greet", "data": {"hi": 1}}));
    }

    #[test]
    fn test_session_data() {
        let (connection, _rx) = create_test_connection();
        assert!(!connection.is_authenticated());

        connection.set_data("user", json!({"id": "7"}));
        connection.set_data(AUTHENTICATED_KEY, json!(true));

        assert!(connection.is_authenticated());
        assert_eq!(connection.data("user"), Some(json!({"id": "7"})));
        assert_eq!(connection.all_data().len(), 2);
        assert_eq!(connection.remove_data("user"), Some(json!({"id": "7"})));
        assert_eq!(connection.data("user"), None);
    }

    #[test]
    fn test_close() {
        let (connection, mut rx) = create_test_connection();
        connection.close();

        assert!(connection.is_closed());
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Close);
        assert_eq!(
            connection.send(&OutboundMessage::new("x", json!({}))),
            Err(TransportError::Closed)
        );
    }
}
