//! Wire types for the Galileo paced upload protocol.
//!
//! Control messages travel as JSON text frames; file chunks travel as raw
//! binary frames. Inbound server messages are decoded once, here, into a
//! [`ServerSignal`].

pub mod constants;
pub mod messages;
pub mod signal;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, UNKNOWN_UPLOAD_ERROR};
pub use messages::{CompletionAck, ErrorRecord, Handshake};
pub use signal::ServerSignal;

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
