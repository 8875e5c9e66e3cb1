//! # relay-core
//!
//! Event routing and acknowledgement correlation for connection-oriented messaging.
//!
//! Inbound frames flow through the [`MessageRouter`], which validates and decodes them
//! into [`ClientEvent`]s, answers reserved system events and fans application events out
//! to registered handlers. The [`EventDispatcher`] provides the prioritized listener
//! registry, middleware pipeline and acknowledgement futures. Broadcast targets are
//! resolved through the [`RoomManager`] and [`ConnectionRegistry`].

pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod promise;
pub mod protocol;
pub mod rooms;
pub mod router;

pub use connection::{
    ChannelTransport, Connection, ConnectionId, ConnectionRegistry, OutboundFrame, Transport,
    TransportError, AUTHENTICATED_KEY,
};
pub use dispatcher::{
    DispatchError, EventDispatcher, ListenerId, ListenerInfo, ListenerResult, MiddlewareAction,
    PendingAcknowledgement, ACK_ID_KEY, LISTENER_ERROR_EVENT, WILDCARD_EVENT,
};
pub use events::{AckCallback, ClientEvent, Event};
pub use promise::{Promise, PromiseState, Resolver};
pub use protocol::{Codec, CodecError, EnvelopeMeta, InboundEnvelope, JsonCodec, OutboundMessage};
pub use rooms::RoomManager;
pub use router::{
    AuthError, Authenticator, BroadcastOptions, HandlerResult, MessageError, MessageRouter,
    RejectAllAuthenticator, RouteOutcome, CONNECTION_ERROR_EVENT, CONNECT_EVENT, DEFAULT_VALIDATOR,
    DISCONNECT_EVENT,
};
