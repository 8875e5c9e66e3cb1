//! Connection management
//!
//! A [`Connection`] wraps a transport handle plus per-connection session data;
//! the [`ConnectionRegistry`] tracks every live connection.

mod connection;
mod registry;
mod transport;

pub use connection::{Connection, ConnectionId, AUTHENTICATED_KEY};
pub use registry::ConnectionRegistry;
pub use transport::{ChannelTransport, OutboundFrame, Transport, TransportError};
