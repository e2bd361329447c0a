//! WebSocket driver for the Galileo paced upload protocol.
//!
//! Connects to the server, feeds transport events into a
//! [`galileo_transfer::Session`] and carries out the actions it returns:
//! control messages go out as JSON text frames, chunks as binary frames.

pub mod config;
pub mod error;
mod pumps;
pub mod uploader;

pub use config::UploadConfig;
pub use error::ClientError;
pub use uploader::Uploader;

pub use galileo_transfer::{
    Callbacks, FileSource, LocalFile, LogObserver, MemorySource, ObserverSet, UploadObserver,
    UploadOutcome,
};
