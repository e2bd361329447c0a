use std::time::Duration;

/// Chunk size used when neither the caller nor the server asks for one.
pub const DEFAULT_CHUNK_SIZE: u64 = 250_000;

/// Largest chunk the client will send in one frame, whatever the server
/// or the caller asks for. Matches tungstenite's default inbound message
/// limit, so a stock server can always accept it.
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Message of the error record synthesized when a session fails without
/// the server ever reporting why.
pub const UNKNOWN_UPLOAD_ERROR: &str = "Unknown upload error";

/// Maximum inbound WebSocket message size in bytes (16 MB).
///
/// Server messages are small JSON objects; the limit only guards against
/// a misbehaving peer.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// How long to wait for the server to finish the WebSocket closing
/// handshake after the client asked to close.
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
