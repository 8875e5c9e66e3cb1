//! Event model
//!
//! [`Event`] is a named payload with broadcast targeting; [`ClientEvent`] adds the
//! originating connection and acknowledgement state.

mod client_event;
mod event;

pub use client_event::{AckCallback, ClientEvent};
pub use event::Event;
