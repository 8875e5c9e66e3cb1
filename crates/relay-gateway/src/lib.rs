//! # relay-gateway
//!
//! WebSocket transport for the relay event router. Each upgraded socket becomes a
//! [`relay_core::Connection`]; frames are routed through a shared
//! [`relay_core::MessageRouter`].

pub mod auth;
pub mod server;

pub use auth::JwtAuthenticator;
pub use server::{create_app, create_gateway_state, run, run_server, GatewayState};
