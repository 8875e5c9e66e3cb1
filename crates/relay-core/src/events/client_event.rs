//! Events received from a connection

use super::event::Event;
use crate::connection::{Connection, TransportError};
use crate::dispatcher::ACK_ID_KEY;
use crate::protocol::{EnvelopeMeta, OutboundMessage};
use crate::router::MessageError;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use uuid::Uuid;

/// Called with the response when a client event is acknowledged
pub type AckCallback = Box<dyn Fn(&Value) + Send + Sync>;

/// An event originating from a connection
///
/// Holds only a weak reference to the connection; once the connection is gone,
/// replies are silently skipped.
pub struct ClientEvent {
    event: Event,
    client_id: String,
    connection: Weak<Connection>,
    requires_ack: bool,
    ack_id: OnceLock<String>,
    acknowledged: AtomicBool,
    ack_callback: Option<AckCallback>,
}

impl ClientEvent {
    /// Create a client event for `connection`
    pub fn new(name: impl Into<String>, data: Map<String, Value>, connection: &Arc<Connection>) -> Self {
        Self {
            event: Event::new(name).with_data(data),
            client_id: connection.id().to_string(),
            connection: Arc::downgrade(connection),
            requires_ack: false,
            ack_id: OnceLock::new(),
            acknowledged: AtomicBool::new(false),
            ack_callback: None,
        }
    }

    /// Build a client event from a decoded envelope
    ///
    /// `event` must be a string and `data`, when present and not null, an object.
    /// Acknowledgement metadata is read from `meta`; an `_ackId` inside `data` is
    /// accepted as the ack id as well.
    pub fn from_value(value: Value, connection: &Arc<Connection>) -> Result<Self, MessageError> {
        let Value::Object(mut envelope) = value else {
            return Err(MessageError::MissingEventName);
        };
        let Some(Value::String(name)) = envelope.remove("event") else {
            return Err(MessageError::MissingEventName);
        };
        if name.is_empty() {
            return Err(MessageError::MissingEventName);
        }

        let data = match envelope.remove("data") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(data)) => data,
            Some(_) => return Err(MessageError::Validation("data must be an object".to_string())),
        };

        let meta: EnvelopeMeta = match envelope.remove("meta") {
            None | Some(Value::Null) => EnvelopeMeta::default(),
            Some(meta) => serde_json::from_value(meta).map_err(|e| MessageError::Validation(e.to_string()))?,
        };

        let ack_id = meta
            .ack_id
            .or_else(|| data.get(ACK_ID_KEY).and_then(Value::as_str).map(str::to_string));

        let mut event = Self::new(name, data, connection).requiring_ack(meta.requires_ack);
        if let Some(id) = ack_id {
            event.ack_id = OnceLock::from(id);
        }
        Ok(event)
    }

    /// Set whether the sender expects an acknowledgement
    #[must_use]
    pub fn requiring_ack(mut self, requires_ack: bool) -> Self {
        self.requires_ack = requires_ack;
        self
    }

    /// Install a callback run when the event is acknowledged
    #[must_use]
    pub fn with_ack_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.ack_callback = Some(Box::new(callback));
        self
    }

    pub fn name(&self) -> &str {
        self.event.name()
    }

    pub fn data(&self) -> &Map<String, Value> {
        self.event.data()
    }

    /// Add a payload field
    pub fn add_data(&mut self, key: impl Into<String>, value: Value) {
        self.event.add_data(key, value);
    }

    /// Underlying event
    pub fn as_event(&self) -> &Event {
        &self.event
    }

    /// Originating connection, if still alive
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }

    /// Check if the originating connection is still alive
    pub fn has_connection(&self) -> bool {
        self.connection.strong_count() > 0
    }

    /// Id of the originating connection
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn requires_ack(&self) -> bool {
        self.requires_ack
    }

    /// Acknowledgement id, generated on first use
    pub fn ack_id(&self) -> &str {
        self.ack_id
            .get_or_init(|| format!("ack_{}", Uuid::new_v4().simple()))
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// Acknowledge the event
    ///
    /// Runs the acknowledgement callback and, when the sender asked for it, sends the
    /// `ack` envelope. Returns `false` if the event was already acknowledged.
    pub fn acknowledge(&self, response: Value) -> bool {
        if self.acknowledged.swap(true, Ordering::SeqCst) {
            return false;
        }

        if let Some(callback) = &self.ack_callback {
            callback(&response);
        }

        if self.requires_ack {
            if let Some(connection) = self.connection() {
                let message = OutboundMessage::ack(self.name(), Some(self.ack_id()), response);
                if let Err(e) = connection.send(&message) {
                    tracing::debug!(connection_id = %self.client_id, event = %self.name(), error = %e, "Failed to send acknowledgement");
                }
            }
        }
        true
    }

    /// Send `<event>_response` back to the originating connection
    pub fn respond(&self, data: Value) -> Result<(), TransportError> {
        match self.connection() {
            Some(connection) => connection.send(&OutboundMessage::response(self.name(), data)),
            None => Err(TransportError::Closed),
        }
    }

    /// Read session data of the originating connection
    ///
    /// `None` as key returns the whole session as an object.
    pub fn client_data(&self, key: Option<&str>) -> Option<Value> {
        let connection = self.connection()?;
        match key {
            Some(key) => connection.data(key),
            None => Some(Value::Object(connection.all_data())),
        }
    }

    /// Store session data on the originating connection
    pub fn set_client_data(&self, key: impl Into<String>, value: Value) {
        if let Some(connection) = self.connection() {
            connection.set_data(key, value);
        }
    }

    /// Turn this event into a broadcast towards `rooms` (all connections when empty)
    pub fn broadcast_to(&self, rooms: &[&str]) -> Event {
        let mut event = self.event.clone().with_broadcast(true);
        if !rooms.is_empty() {
            event.set_rooms(rooms.iter().map(|r| (*r).to_string()).collect());
        }
        event
    }

    /// Wire representation including the originating client
    pub fn to_envelope(&self) -> Value {
        let mut envelope = self.event.to_envelope();
        if let Some(meta) = envelope.get_mut("meta").and_then(Value::as_object_mut) {
            meta.insert("clientId".to_string(), Value::String(self.client_id.clone()));
            meta.insert("requiresAck".to_string(), Value::Bool(self.requires_ack));
        }
        if self.requires_ack {
            if let Some(data) = envelope.get_mut("data").and_then(Value::as_object_mut) {
                data.entry(ACK_ID_KEY)
                    .or_insert_with(|| Value::String(self.ack_id().to_string()));
            }
        }
        envelope
    }
}

impl std::fmt::Debug for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEvent")
            .field("name", &self.name())
            .field("client_id", &self.client_id)
            .field("requires_ack", &self.requires_ack)
            .field("acknowledged", &self.is_acknowledged())
            .finish()
    }
}
