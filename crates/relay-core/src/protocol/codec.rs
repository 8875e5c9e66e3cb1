//! Frame codecs
//!
//! A codec turns structured values into text frames and back. JSON is built in;
//! other formats can be registered on the router by name.

use serde_json::Value;
use thiserror::Error;

/// Codec error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Codec error: {0}")]
pub struct CodecError(pub String);

/// Encodes and decodes frames
pub trait Codec: Send + Sync {
    /// Format name used for registration
    fn name(&self) -> &str;

    /// Encode a value into a frame
    fn encode(&self, value: &Value) -> Result<String, CodecError>;

    /// Decode a frame into a value
    fn decode(&self, raw: &str) -> Result<Value, CodecError>;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<Value, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError(e.to_string()))
    }
}

impl std::fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Codec({})", self.name())
    }
}
