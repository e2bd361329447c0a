use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;
use crate::constants::UNKNOWN_UPLOAD_ERROR;

// ---------------------------------------------------------------------------
// Outbound control messages
// ---------------------------------------------------------------------------

/// Announces the file; sent exactly once, right after the connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub name: String,
    pub size: u64,
}

impl Handshake {
    /// Encodes the handshake as a JSON text payload.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Tells the server the transfer is logically complete.
///
/// Sent in reply to every ready signal that arrives after the last chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionAck {
    pub finished: bool,
}

impl Default for CompletionAck {
    fn default() -> Self {
        Self { finished: true }
    }
}

impl CompletionAck {
    /// Encodes the ack as a JSON text payload.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Error records
// ---------------------------------------------------------------------------

/// One error reported during a session, by the server or by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default)]
    pub fatal: bool,
    /// The JSON object this record was decoded from.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl ErrorRecord {
    /// Builds a record from an inbound `{"error": ..., "fatal"?: ...}` object.
    ///
    /// String errors are taken verbatim; any other JSON value is kept as
    /// its compact JSON text.
    pub fn from_payload(raw: Value) -> Self {
        let message = match raw.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let fatal = raw.get("fatal").is_some_and(is_truthy);
        Self {
            message,
            fatal,
            raw,
        }
    }

    /// A record raised on the client side, shaped like a server error.
    pub fn local(message: impl Into<String>, fatal: bool) -> Self {
        let message = message.into();
        let raw = serde_json::json!({ "error": message, "fatal": fatal });
        Self {
            message,
            fatal,
            raw,
        }
    }

    /// The record reported when a session fails with no error on file.
    pub fn unknown() -> Self {
        Self {
            message: UNKNOWN_UPLOAD_ERROR.into(),
            fatal: false,
            raw: serde_json::json!({ "error": UNKNOWN_UPLOAD_ERROR }),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fatal {
            write!(f, "{} (fatal)", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Loose "is this field set" check used by the wire format.
///
/// `null`, `false`, `0` and `""` are unset; everything else,
/// including empty arrays and objects, is set.
pub(crate) fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
