//! Event dispatching
//!
//! Prioritized listener registry with middleware, acknowledgement correlation,
//! `wait_for` futures and cross-dispatcher forwarding.

mod ack;
mod dispatcher;
mod error;
mod listener;

pub use ack::PendingAcknowledgement;
pub use dispatcher::EventDispatcher;
pub use error::DispatchError;
pub use listener::{ListenerId, ListenerInfo, ListenerResult, MiddlewareAction};

/// Event name matching every emission
pub const WILDCARD_EVENT: &str = "*";

/// Event emitted when a listener returns an error
pub const LISTENER_ERROR_EVENT: &str = "listener_error";

/// Payload key carrying the acknowledgement id
pub const ACK_ID_KEY: &str = "_ackId";
