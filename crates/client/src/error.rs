//! Client error types.

use tokio_tungstenite::tungstenite;

/// Errors from the upload client.
///
/// Upload failures themselves are reported through the observer and the
/// returned outcome; these cover setup and the driver's own plumbing.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] galileo_protocol::ProtocolError),

    #[error("transfer error: {0}")]
    Transfer(#[from] galileo_transfer::TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("connection closed")]
    Closed,
}
