//! Integration test utilities for the relay
//!
//! Helpers for driving the router through in-memory transports and for running
//! the WebSocket gateway on an ephemeral port.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
