//! Server-paced upload state machine.
//!
//! A [`Session`] consumes transport events (open, inbound signal, close) and
//! returns the [`Action`]s the transport driver must carry out, in order.
//! It performs no I/O itself, so the whole protocol can be exercised
//! without a live connection.

mod observer;
mod session;
mod source;

pub use galileo_protocol::DEFAULT_CHUNK_SIZE;
pub use observer::{Callbacks, LogObserver, ObserverSet, UploadObserver, notify};
pub use session::{Action, Session, SessionState, UploadOutcome};
pub use source::{FileSource, LocalFile, MemorySource};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid slice [{start}, {end}) of a {size}-byte file")]
    InvalidRange { start: u64, end: u64, size: u64 },
}
