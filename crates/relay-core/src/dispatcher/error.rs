//! Dispatcher error types

use thiserror::Error;

/// Dispatcher error type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Registration refused because the listener cap is reached
    #[error("Maximum listeners exceeded ({max})")]
    TooManyListeners { max: usize },

    /// No acknowledgement arrived before the deadline
    #[error("Timeout waiting for acknowledgement of '{event}' ({ack_id})")]
    AckTimeout { event: String, ack_id: String },

    /// No matching event arrived before the deadline
    #[error("Timeout waiting for event '{event}'")]
    WaitTimeout { event: String },

    /// The acknowledgement request could not be sent to the peer
    #[error("Acknowledgement request could not be delivered: {0}")]
    Undeliverable(String),

    /// The dispatcher was shut down, or the resolver was dropped
    #[error("Operation cancelled")]
    Cancelled,

    /// Timers need a tokio runtime
    #[error("No async runtime available to schedule timers")]
    RuntimeUnavailable,
}

impl DispatchError {
    /// Check if this error is a deadline expiry
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AckTimeout { .. } | Self::WaitTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout() {
        assert!(DispatchError::WaitTimeout {
            event: "x".to_string()
        }
        .is_timeout());
        assert!(DispatchError::AckTimeout {
            event: "x".to_string(),
            ack_id: "a".to_string()
        }
        .is_timeout());
        assert!(!DispatchError::Cancelled.is_timeout());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            DispatchError::TooManyListeners { max: 2 }.to_string(),
            "Maximum listeners exceeded (2)"
        );
    }
}
