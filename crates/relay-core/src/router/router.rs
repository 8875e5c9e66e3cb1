//! Message router
//!
//! Validates and decodes inbound frames, answers system events, runs application
//! handlers and composes room-filtered broadcasts.

use super::auth::{Authenticator, RejectAllAuthenticator};
use super::broadcast::BroadcastOptions;
use super::error::MessageError;
use super::system::{self, SystemContext};
use super::{CONNECTION_ERROR_EVENT, CONNECT_EVENT, DISCONNECT_EVENT};
use crate::connection::{Connection, ConnectionRegistry, Transport, TransportError};
use crate::dispatcher::{DispatchError, EventDispatcher, MiddlewareAction, LISTENER_ERROR_EVENT, WILDCARD_EVENT};
use crate::events::{ClientEvent, Event};
use crate::promise::Promise;
use crate::protocol::{Codec, JsonCodec, OutboundMessage};
use crate::rooms::RoomManager;
use parking_lot::RwLock;
use relay_common::RouterSettings;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Return value of an application handler
pub type HandlerResult = anyhow::Result<Option<Value>>;

type HandlerFn = Arc<dyn Fn(&ClientEvent) -> HandlerResult + Send + Sync>;
type ValidatorFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type RouterMiddlewareFn = Arc<dyn Fn(&ClientEvent) -> MiddlewareAction + Send + Sync>;

/// Name of the built-in validator
pub const DEFAULT_VALIDATOR: &str = "default";

/// Dispatcher events a client is not allowed to trigger
const RESERVED_DISPATCHER_EVENTS: [&str; 5] = [
    CONNECT_EVENT,
    DISCONNECT_EVENT,
    CONNECTION_ERROR_EVENT,
    LISTENER_ERROR_EVENT,
    WILDCARD_EVENT,
];

/// How an inbound message was handled
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Answered by a reserved system handler
    System,
    /// Application handlers and listeners ran; their non-null results
    Handled { results: Vec<Value> },
    /// Nobody handles this event
    Unhandled,
    /// A router middleware blocked the event
    Blocked,
}

/// Routes inbound messages and outbound broadcasts
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    dispatcher: EventDispatcher,
    settings: RouterSettings,
    validators: RwLock<Vec<(String, ValidatorFn)>>,
    codecs: RwLock<HashMap<String, Arc<dyn Codec>>>,
    codec: Arc<RwLock<Arc<dyn Codec>>>,
    handlers: RwLock<HashMap<String, Vec<HandlerFn>>>,
    middlewares: RwLock<Vec<RouterMiddlewareFn>>,
    authenticator: RwLock<Arc<dyn Authenticator>>,
}

impl MessageRouter {
    /// Create a router with its own registry and room manager
    pub fn new(settings: RouterSettings, dispatcher: EventDispatcher) -> Self {
        Self::with_state(
            settings,
            dispatcher,
            Arc::new(ConnectionRegistry::new()),
            Arc::new(RoomManager::new()),
        )
    }

    /// Create a router over an existing registry and room manager
    pub fn with_state(
        settings: RouterSettings,
        dispatcher: EventDispatcher,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
    ) -> Self {
        let json: Arc<dyn Codec> = Arc::new(JsonCodec);
        let mut codecs = HashMap::new();
        codecs.insert(json.name().to_string(), Arc::clone(&json));

        if settings.message_format != json.name() {
            tracing::warn!(
                format = %settings.message_format,
                "Message format not registered yet, using json until it is"
            );
        }

        let router = Self {
            registry,
            rooms,
            dispatcher,
            settings,
            validators: RwLock::new(Vec::new()),
            codecs: RwLock::new(codecs),
            codec: Arc::new(RwLock::new(json)),
            handlers: RwLock::new(HashMap::new()),
            middlewares: RwLock::new(Vec::new()),
            authenticator: RwLock::new(Arc::new(RejectAllAuthenticator)),
        };
        let active = Arc::clone(&router.codec);
        router.register_validator(DEFAULT_VALIDATOR, move |raw| {
            let codec = Arc::clone(&*active.read());
            default_validator(codec.as_ref(), raw)
        });
        router
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    /// Register a handler for an application event
    ///
    /// Handlers of the same event run in registration order.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&ClientEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Remove every handler of an event
    pub fn off(&self, event: &str) -> usize {
        self.handlers.write().remove(event).map_or(0, |h| h.len())
    }

    /// Check if an event has application handlers
    pub fn has_handlers(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    /// Add a middleware run before application handlers
    pub fn add_middleware<F>(&self, middleware: F)
    where
        F: Fn(&ClientEvent) -> MiddlewareAction + Send + Sync + 'static,
    {
        self.middlewares.write().push(Arc::new(middleware));
    }

    /// Register a named validator for raw frames
    ///
    /// Registering an existing name replaces that validator in place.
    pub fn register_validator<F>(&self, name: &str, validator: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let mut validators = self.validators.write();
        let validator: ValidatorFn = Arc::new(validator);
        match validators.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = validator,
            None => validators.push((name.to_string(), validator)),
        }
    }

    /// Remove a validator by name
    pub fn remove_validator(&self, name: &str) -> bool {
        let mut validators = self.validators.write();
        let before = validators.len();
        validators.retain(|(n, _)| n != name);
        validators.len() != before
    }

    /// Register a codec under its own name
    ///
    /// Becomes active right away when it is the configured message format.
    pub fn register_codec(&self, codec: Arc<dyn Codec>) {
        let name = codec.name().to_string();
        self.codecs.write().insert(name.clone(), codec);
        if name == self.settings.message_format {
            self.set_message_format(&name);
        }
    }

    /// Switch the active codec
    ///
    /// Live connections switch too, and the default validator decodes with the new
    /// codec. Returns `false` for an unknown format.
    pub fn set_message_format(&self, format: &str) -> bool {
        let Some(codec) = self.codecs.read().get(format).cloned() else {
            tracing::warn!(format, "Unknown message format");
            return false;
        };
        *self.codec.write() = Arc::clone(&codec);
        for connection in self.registry.get_all() {
            connection.set_codec(Arc::clone(&codec));
        }
        tracing::debug!(format, "Message format changed");
        true
    }

    /// Name of the active codec
    pub fn message_format(&self) -> String {
        self.codec.read().name().to_string()
    }

    /// Install the authenticator used for `authenticate` events
    pub fn set_authenticator(&self, authenticator: impl Authenticator + 'static) {
        *self.authenticator.write() = Arc::new(authenticator);
    }

    // ---------------------------------------------------------------------
    // Inbound
    // ---------------------------------------------------------------------

    /// Handle one inbound frame from `connection`
    ///
    /// Message-level failures are reported to the connection as an `error` envelope
    /// and returned. Handler failures are not: they are answered with an internal
    /// error response and the remaining handlers still run.
    pub fn handle_inbound(&self, raw: &str, connection: &Arc<Connection>) -> Result<RouteOutcome, MessageError> {
        match self.route(raw, connection) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::debug!(connection_id = %connection.id(), error = %err, "Rejected inbound message");
                send_error(connection, &err.client_message());
                Err(err)
            }
        }
    }

    fn route(&self, raw: &str, connection: &Arc<Connection>) -> Result<RouteOutcome, MessageError> {
        let validators = self.validators.read().clone();
        if let Some((name, _)) = validators.iter().find(|(_, validate)| !validate(raw)) {
            return Err(MessageError::Validation(format!("rejected by validator '{name}'")));
        }

        let codec = Arc::clone(&*self.codec.read());
        let decoded = codec
            .decode(raw)
            .map_err(|e| MessageError::Deserialize(e.0))?;
        if !decoded.is_object() {
            return Err(MessageError::Deserialize("expected an object".to_string()));
        }

        let event = ClientEvent::from_value(decoded, connection)?;
        tracing::trace!(connection_id = %connection.id(), event = %event.name(), "Inbound event");

        if system::is_system_event(event.name()) {
            let authenticator = Arc::clone(&*self.authenticator.read());
            system::handle(
                &event,
                &SystemContext {
                    registry: &self.registry,
                    rooms: &self.rooms,
                    dispatcher: &self.dispatcher,
                    authenticator: authenticator.as_ref(),
                },
            );
            return Ok(RouteOutcome::System);
        }

        Ok(self.handle_application_event(&event))
    }

    fn handle_application_event(&self, event: &ClientEvent) -> RouteOutcome {
        let middlewares = self.middlewares.read().clone();
        if middlewares
            .iter()
            .any(|middleware| middleware(event) == MiddlewareAction::Block)
        {
            tracing::debug!(connection_id = %event.client_id(), event = %event.name(), "Event blocked by middleware");
            return RouteOutcome::Blocked;
        }

        let handlers = self
            .handlers
            .read()
            .get(event.name())
            .cloned()
            .unwrap_or_default();
        let forwarded = !RESERVED_DISPATCHER_EVENTS.contains(&event.name());
        let has_listeners = forwarded && self.dispatcher.has_listeners(event.name());

        let mut results = Vec::new();
        for (index, handler) in handlers.iter().enumerate() {
            match handler(event) {
                Ok(Some(value)) if !value.is_null() => {
                    let reply = if value.is_object() || value.is_array() {
                        value.clone()
                    } else {
                        json!({ "result": value })
                    };
                    if let Err(e) = event.respond(reply) {
                        tracing::debug!(connection_id = %event.client_id(), error = %e, "Failed to send handler response");
                    }
                    results.push(value);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        connection_id = %event.client_id(),
                        event = %event.name(),
                        error = %err,
                        "Event handler failed"
                    );
                    self.dispatcher.emit(
                        LISTENER_ERROR_EVENT,
                        json!({
                            "event": event.name(),
                            "listenerId": format!("handler_{}", index + 1),
                            "connectionId": event.client_id(),
                            "error": err.to_string(),
                        }),
                    );
                    // Best effort; the connection may already be gone
                    let _ = event.respond(json!({
                        "error": true,
                        "message": "Internal server error",
                        "code": 500,
                    }));
                }
            }
        }

        if forwarded {
            results.extend(self.dispatcher.emit(event.name(), Value::Object(event.data().clone())));
        }

        let handled = !handlers.is_empty() || has_listeners;
        if !handled {
            tracing::debug!(connection_id = %event.client_id(), event = %event.name(), "No handler for event");
            if self.settings.respond_to_unknown_events {
                if let Some(connection) = event.connection() {
                    send_error(
                        &connection,
                        &MessageError::UnknownEvent(event.name().to_string()).client_message(),
                    );
                }
            }
        }

        if event.requires_ack() && !event.is_acknowledged() {
            event.acknowledge(Value::Array(results.clone()));
        }

        if handled {
            RouteOutcome::Handled { results }
        } else {
            RouteOutcome::Unhandled
        }
    }

    // ---------------------------------------------------------------------
    // Outbound
    // ---------------------------------------------------------------------

    /// Deliver an event to the connections it targets
    ///
    /// Targets are the members of the given rooms (every connection when no rooms
    /// are given) minus the excluded ids. The frame is encoded once; a failed send
    /// to one connection does not affect the others. Returns the number of
    /// connections the frame was handed to.
    pub fn broadcast(&self, event: &Event, options: &BroadcastOptions) -> usize {
        if !event.should_broadcast() {
            return 0;
        }

        let rooms = options.rooms.as_deref().unwrap_or(event.rooms());
        let except = options.except.as_deref().unwrap_or(event.except());

        let targets: Vec<Arc<Connection>> = if rooms.is_empty() {
            self.registry.get_all()
        } else {
            self.rooms
                .connections_in_rooms(rooms)
                .iter()
                .filter_map(|id| self.registry.find_by_id(id))
                .collect()
        };

        let frame = match self.codec.read().encode(&event.to_envelope()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(event = %event.name(), error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        let delivered = targets
            .iter()
            .filter(|connection| !except.iter().any(|id| id == connection.id()))
            .filter(|connection| connection.send_raw(frame.clone()).is_ok())
            .count();

        tracing::debug!(event = %event.name(), rooms = ?rooms, delivered, "Broadcast sent");
        delivered
    }

    /// Broadcast a named payload with explicit targeting
    pub fn emit_broadcast(&self, event: &str, data: Map<String, Value>, options: &BroadcastOptions) -> usize {
        self.broadcast(&Event::new(event).with_data(data), options)
    }

    /// Broadcast to the members of one room
    pub fn emit_to_room(&self, room: &str, event: &str, data: Map<String, Value>) -> usize {
        self.broadcast(
            &Event::new(event).with_data(data).with_room(room),
            &BroadcastOptions::default(),
        )
    }

    /// Send an event to one connection
    pub fn emit_to_connection(&self, connection_id: &str, event: &str, data: Map<String, Value>) -> Result<(), TransportError> {
        let connection = self
            .registry
            .find_by_id(connection_id)
            .ok_or(TransportError::Closed)?;
        let envelope = Event::new(event).with_data(data).with_broadcast(false).to_envelope();
        connection.send_value(&envelope)
    }

    /// Send an event to one connection and wait for its acknowledgement
    ///
    /// The client acknowledges with `{"event": "ack", "data": {"ackId": ..., "response": ...}}`.
    pub fn emit_to_connection_with_ack(
        &self,
        connection_id: &str,
        event: &str,
        data: Value,
        timeout: Option<Duration>,
    ) -> Promise<Value> {
        let Some(connection) = self.registry.find_by_id(connection_id) else {
            return Promise::rejected(DispatchError::Undeliverable(format!(
                "unknown connection {connection_id}"
            )));
        };
        let (ack_id, promise) = match self.dispatcher.register_ack(event, timeout) {
            Ok(registered) => registered,
            Err(err) => return Promise::rejected(err),
        };

        let message = OutboundMessage::with_ack_request(event, data, ack_id.clone());
        if let Err(e) = connection.send(&message) {
            self.dispatcher
                .reject_ack(&ack_id, DispatchError::Undeliverable(e.to_string()));
        }
        promise
    }

    // ---------------------------------------------------------------------
    // Transport lifecycle
    // ---------------------------------------------------------------------

    /// Register a newly opened transport
    pub fn on_connect(&self, transport: Box<dyn Transport>) -> Arc<Connection> {
        let connection = Connection::new(transport, Arc::clone(&*self.codec.read()));
        self.registry.add(Arc::clone(&connection));

        tracing::info!(
            connection_id = %connection.id(),
            transport_key = %connection.transport_key(),
            "Connection opened"
        );
        self.dispatcher.emit(
            CONNECT_EVENT,
            json!({
                "connectionId": connection.id(),
                "transportKey": connection.transport_key(),
            }),
        );
        connection
    }

    /// Route a frame received on a transport
    pub fn on_message(&self, transport_key: &str, raw: &str) -> Result<RouteOutcome, MessageError> {
        let connection = self
            .registry
            .find_by_transport_key(transport_key)
            .ok_or_else(|| MessageError::UnknownConnection(transport_key.to_string()))?;
        self.handle_inbound(raw, &connection)
    }

    /// Tear down the connection behind a transport
    pub fn on_disconnect(&self, transport_key: &str) -> Option<Arc<Connection>> {
        let connection = self.registry.find_by_transport_key(transport_key)?;
        self.disconnect(connection.id())
    }

    /// Report a transport error and close the connection
    pub fn on_error(&self, transport_key: &str, error: &dyn std::fmt::Display) {
        let Some(connection) = self.registry.find_by_transport_key(transport_key) else {
            tracing::debug!(transport_key, error = %error, "Error on unknown transport");
            return;
        };

        tracing::warn!(connection_id = %connection.id(), error = %error, "Transport error");
        self.dispatcher.emit(
            CONNECTION_ERROR_EVENT,
            json!({
                "connectionId": connection.id(),
                "error": error.to_string(),
            }),
        );
        connection.close();
    }

    /// Remove a connection from the registry and from every room
    ///
    /// Only the first call for an id has an effect.
    pub fn disconnect(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let connection = self.registry.remove(connection_id)?;
        let rooms = self.rooms.remove_connection_from_all_rooms(connection_id);

        tracing::info!(
            connection_id,
            rooms = rooms.len(),
            age_ms = connection.age().as_millis() as u64,
            "Connection closed"
        );
        self.dispatcher.emit(
            DISCONNECT_EVENT,
            json!({
                "connectionId": connection_id,
                "rooms": rooms,
            }),
        );
        Some(connection)
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("connections", &self.registry.count())
            .field("rooms", &self.rooms.get_all_rooms().len())
            .field("message_format", &self.message_format())
            .finish()
    }
}

/// Accept frames the active codec decodes into a value with an `event` key
fn default_validator(codec: &dyn Codec, raw: &str) -> bool {
    codec
        .decode(raw)
        .ok()
        .is_some_and(|value| value.get("event").is_some())
}

fn send_error(connection: &Connection, message: &str) {
    if let Err(e) = connection.send(&OutboundMessage::error(message)) {
        tracing::debug!(connection_id = %connection.id(), error = %e, "Failed to send error envelope");
    }
}
