//! Envelope formats
//!
//! Every frame exchanged with a peer is an envelope of the form
//! `{ "event": "<name>", "data": { ... }, "meta"?: { "requiresAck": bool, "ackId": "<id>" } }`.

use super::{unix_timestamp, ACK_EVENT, ERROR_EVENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope received from a peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// Event name
    pub event: String,

    /// Event payload
    #[serde(default)]
    pub data: Value,

    /// Acknowledgement metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<EnvelopeMeta>,
}

/// Acknowledgement metadata carried by an envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    /// Whether the sender expects an `ack` reply
    #[serde(default)]
    pub requires_ack: bool,

    /// Correlation id for the `ack` reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
}

/// Message sent to a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Event name
    pub event: String,

    /// Event payload
    pub data: Value,

    /// Acknowledgement request (server to client)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<EnvelopeMeta>,
}

impl OutboundMessage {
    /// Create a plain event message
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            meta: None,
        }
    }

    /// Create an event message that asks the peer to acknowledge it
    #[must_use]
    pub fn with_ack_request(event: impl Into<String>, data: Value, ack_id: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data,
            meta: Some(EnvelopeMeta {
                requires_ack: true,
                ack_id: Some(ack_id.into()),
            }),
        }
    }

    /// Create a structured error reply
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            ERROR_EVENT,
            json!({
                "message": message.into(),
                "timestamp": unix_timestamp(),
            }),
        )
    }

    /// Create an acknowledgement reply for `event`
    #[must_use]
    pub fn ack(event: &str, ack_id: Option<&str>, response: Value) -> Self {
        let mut data = json!({
            "event": event,
            "response": response,
            "timestamp": unix_timestamp(),
        });
        if let (Some(id), Some(map)) = (ack_id, data.as_object_mut()) {
            map.insert("ackId".to_string(), Value::String(id.to_string()));
        }
        Self::new(ACK_EVENT, data)
    }

    /// Create a handler response for `event` (sent as `<event>_response`)
    #[must_use]
    pub fn response(event: &str, data: Value) -> Self {
        Self::new(format!("{event}_response"), data)
    }

    /// Check if this is an error reply
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.event == ERROR_EVENT
    }
}

impl std::fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.meta {
            Some(EnvelopeMeta {
                ack_id: Some(id), ..
            }) => write!(f, "OutboundMessage(event={}, ack={id})", self.event),
            _ => write!(f, "OutboundMessage(event={})", self.event),
        }
    }
}
