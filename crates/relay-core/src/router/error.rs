//! Message-level errors
//!
//! Each of these aborts the handling of a single inbound message. The originating
//! connection is told through an `error` envelope carrying [`MessageError::client_message`].

use thiserror::Error;

/// Inbound message error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    /// A validator rejected the raw frame
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The frame could not be decoded into an object
    #[error("Deserialization failed: {0}")]
    Deserialize(String),

    /// The envelope has no usable `event` name
    #[error("Missing event name")]
    MissingEventName,

    /// No handler is registered for the event
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// The transport key does not belong to a registered connection
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),
}

impl MessageError {
    /// Message placed in the error envelope sent to the peer
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(_) => "Invalid message format".to_string(),
            Self::Deserialize(_) => "Failed to deserialize message".to_string(),
            Self::MissingEventName => "Invalid event structure".to_string(),
            Self::UnknownEvent(event) => format!("Unknown event: {event}"),
            Self::UnknownConnection(_) => "Unknown connection".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages() {
        assert_eq!(
            MessageError::Validation("default".to_string()).client_message(),
            "Invalid message format"
        );
        assert_eq!(
            MessageError::Deserialize("eof".to_string()).client_message(),
            "Failed to deserialize message"
        );
        assert_eq!(MessageError::MissingEventName.client_message(), "Invalid event structure");
        assert_eq!(
            MessageError::UnknownEvent("dance".to_string()).client_message(),
            "Unknown event: dance"
        );
    }
}
