//! Wire protocol definitions
//!
//! Defines the inbound envelope, outbound message builders and the codecs used to
//! turn them into frames.

mod codec;
mod messages;

pub use codec::{Codec, CodecError, JsonCodec};
pub use messages::{EnvelopeMeta, InboundEnvelope, OutboundMessage};

/// Reply event name used for acknowledgements
pub const ACK_EVENT: &str = "ack";

/// Event name used for structured error replies
pub const ERROR_EVENT: &str = "error";

/// Current Unix time in fractional seconds
#[must_use]
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
