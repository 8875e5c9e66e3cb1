//! Pending acknowledgements

use crate::promise::Resolver;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;

/// An acknowledgement awaiting its response
///
/// Settled exactly once: either by [`EventDispatcher::handle_ack`](super::EventDispatcher::handle_ack)
/// or by its timeout task. Whichever removes the entry from the pending table wins.
pub struct PendingAcknowledgement {
    pub(crate) ack_id: String,
    pub(crate) event: String,
    pub(crate) resolver: Resolver<Value>,
    pub(crate) timer: AbortHandle,
    pub(crate) created_at: Instant,
}

impl PendingAcknowledgement {
    /// Correlation id
    pub fn ack_id(&self) -> &str {
        &self.ack_id
    }

    /// Name of the event that requested the acknowledgement
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Time since the request was registered
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn cancel_timer(&self) {
        self.timer.abort();
    }
}

impl std::fmt::Debug for PendingAcknowledgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAcknowledgement")
            .field("ack_id", &self.ack_id)
            .field("event", &self.event)
            .field("age", &self.age())
            .finish()
    }
}

/// A `wait_for` registration
pub(crate) struct Waiter {
    pub(crate) event: String,
    pub(crate) listener_id: String,
    pub(crate) resolver: Resolver<Value>,
    pub(crate) timer: AbortHandle,
}
