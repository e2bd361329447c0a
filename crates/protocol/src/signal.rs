//! Inbound server signals.

use serde_json::Value;

use crate::ProtocolError;
use crate::messages::{ErrorRecord, is_truthy};

/// A server message, classified once at the transport boundary.
///
/// Precedence follows the wire format: a set `close` wins over everything
/// else in the same object, then `error`, then `ready`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerSignal {
    /// `{"close": true}`: the server is done with this session.
    Close,
    /// `{"error": ..., "fatal"?: bool}`.
    Error(ErrorRecord),
    /// `{"ready": true, "chunksize"?: n}`: send the next chunk.
    ///
    /// `chunk_size` is `None` unless the server asked for a positive size.
    Ready { chunk_size: Option<u64> },
    /// Any other shape. Carries the payload for diagnostics.
    Unknown(Value),
}

impl ServerSignal {
    /// Decodes a text frame. Fails only if the text is not JSON at all.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    /// Classifies an already-parsed JSON value.
    pub fn from_value(value: Value) -> Self {
        let field_set = |key: &str| value.get(key).is_some_and(is_truthy);

        if field_set("close") {
            return ServerSignal::Close;
        }
        if field_set("error") {
            return ServerSignal::Error(ErrorRecord::from_payload(value));
        }
        if field_set("ready") {
            let chunk_size = value.get("chunksize").and_then(positive_size);
            return ServerSignal::Ready { chunk_size };
        }
        ServerSignal::Unknown(value)
    }

    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerSignal::Close => "close",
            ServerSignal::Error(_) => "error",
            ServerSignal::Ready { .. } => "ready",
            ServerSignal::Unknown(_) => "unknown",
        }
    }
}

/// Reads a chunk size the server asked for; fractional sizes are truncated.
fn positive_size(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return (n > 0).then_some(n);
    }
    let f = v.as_f64()?;
    (f >= 1.0 && f.is_finite()).then(|| f as u64)
}
