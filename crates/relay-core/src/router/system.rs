//! Reserved system events
//!
//! `ping`, `subscribe`, `unsubscribe`, `authenticate` and `ack` never reach
//! application handlers.

use super::auth::Authenticator;
use crate::connection::{ConnectionRegistry, AUTHENTICATED_KEY};
use crate::dispatcher::EventDispatcher;
use crate::events::ClientEvent;
use crate::protocol::{unix_timestamp, ACK_EVENT};
use crate::rooms::RoomManager;
use serde_json::{json, Value};

pub(crate) const PING_EVENT: &str = "ping";
pub(crate) const SUBSCRIBE_EVENT: &str = "subscribe";
pub(crate) const UNSUBSCRIBE_EVENT: &str = "unsubscribe";
pub(crate) const AUTHENTICATE_EVENT: &str = "authenticate";

/// Check if an event name is handled by the router itself
pub(crate) fn is_system_event(name: &str) -> bool {
    matches!(
        name,
        PING_EVENT | SUBSCRIBE_EVENT | UNSUBSCRIBE_EVENT | AUTHENTICATE_EVENT | ACK_EVENT
    )
}

/// What the system handlers need from the router
pub(crate) struct SystemContext<'a> {
    pub registry: &'a ConnectionRegistry,
    pub rooms: &'a RoomManager,
    pub dispatcher: &'a EventDispatcher,
    pub authenticator: &'a dyn Authenticator,
}

/// Handle a reserved event
///
/// Events that asked for an acknowledgement and were not acknowledged here are
/// acknowledged with an empty result list; inbound `ack` events never are.
pub(crate) fn handle(event: &ClientEvent, ctx: &SystemContext<'_>) {
    match event.name() {
        PING_EVENT => ping(event),
        SUBSCRIBE_EVENT => membership(event, ctx, true),
        UNSUBSCRIBE_EVENT => membership(event, ctx, false),
        AUTHENTICATE_EVENT => authenticate(event, ctx.authenticator),
        ACK_EVENT => {
            acknowledgement(event, ctx.dispatcher);
            return;
        }
        _ => return,
    }

    if event.requires_ack() && !event.is_acknowledged() {
        event.acknowledge(Value::Array(Vec::new()));
    }
}

fn reply(event: &ClientEvent, data: Value) {
    if let Err(e) = event.respond(data) {
        tracing::debug!(connection_id = %event.client_id(), event = %event.name(), error = %e, "Failed to send response");
    }
}

fn ping(event: &ClientEvent) {
    reply(event, json!({ "pong": unix_timestamp() }));
    event.acknowledge(Value::Array(Vec::new()));
}

fn membership(event: &ClientEvent, ctx: &SystemContext<'_>, join: bool) {
    let room = event
        .data()
        .get("room")
        .and_then(Value::as_str)
        .filter(|room| !room.is_empty());

    let Some(room) = room else {
        reply(event, json!({ "error": "Room name required" }));
        return;
    };

    if join {
        let client_id = event.client_id();
        let registered = || ctx.registry.find_by_id(client_id).is_some();
        if !ctx.rooms.add_to_room_if(client_id, room, registered) && !ctx.rooms.is_in_room(client_id, room) {
            return;
        }
        reply(event, json!({ "subscribed": true, "room": room }));
    } else {
        ctx.rooms.remove_from_room(event.client_id(), room);
        reply(event, json!({ "unsubscribed": true, "room": room }));
    }
}

fn authenticate(event: &ClientEvent, authenticator: &dyn Authenticator) {
    match authenticator.authenticate(event.data()) {
        Ok(user) => {
            event.set_client_data(AUTHENTICATED_KEY, Value::Bool(true));
            event.set_client_data("user", user.clone());
            tracing::info!(connection_id = %event.client_id(), "Connection authenticated");
            reply(event, json!({ "authenticated": true, "user": user }));
        }
        Err(e) => {
            tracing::debug!(connection_id = %event.client_id(), reason = %e, "Authentication failed");
            reply(event, json!({ "authenticated": false, "error": e.to_string() }));
        }
    }
}

fn acknowledgement(event: &ClientEvent, dispatcher: &EventDispatcher) {
    let Some(ack_id) = event.data().get("ackId").and_then(Value::as_str) else {
        tracing::debug!(connection_id = %event.client_id(), "Acknowledgement without ackId");
        return;
    };
    let response = event.data().get("response").cloned().unwrap_or(Value::Null);
    dispatcher.handle_ack(ack_id, response);
}
