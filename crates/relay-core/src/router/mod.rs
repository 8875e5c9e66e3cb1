//! Message routing
//!
//! Turns inbound frames into [`ClientEvent`](crate::ClientEvent)s, answers the
//! reserved system events and fans application events out to handlers.

mod auth;
mod broadcast;
mod error;
mod router;
mod system;

pub use auth::{AuthError, Authenticator, RejectAllAuthenticator};
pub use broadcast::BroadcastOptions;
pub use error::MessageError;
pub use router::{HandlerResult, MessageRouter, RouteOutcome, DEFAULT_VALIDATOR};

/// Dispatcher event published after a connection registered
pub const CONNECT_EVENT: &str = "connect";

/// Dispatcher event published after a connection was torn down
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Dispatcher event published when the transport reports an error
pub const CONNECTION_ERROR_EVENT: &str = "connection_error";
