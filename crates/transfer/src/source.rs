use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;

/// Random-access byte source for the file being uploaded.
///
/// The session only ever asks for `[start, end)` with
/// `start <= end <= size()`.
pub trait FileSource: Send {
    /// File name announced in the handshake.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Returns the bytes in `[start, end)`.
    fn slice(&mut self, start: u64, end: u64) -> Result<Vec<u8>, TransferError>;
}

fn check_range(start: u64, end: u64, size: u64) -> Result<(), TransferError> {
    if start > end || end > size {
        return Err(TransferError::InvalidRange { start, end, size });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LocalFile
// ---------------------------------------------------------------------------

/// A file on the local filesystem, read on demand.
pub struct LocalFile {
    file: std::fs::File,
    name: String,
    size: u64,
}

impl LocalFile {
    /// Opens `path`. The announced name is the final path component.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self { file, name, size })
    }

    /// Overrides the name sent in the handshake.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl FileSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn slice(&mut self, start: u64, end: u64) -> Result<Vec<u8>, TransferError> {
        check_range(start, end, self.size)?;
        let len = usize::try_from(end - start).map_err(|_| TransferError::InvalidRange {
            start,
            end,
            size: self.size,
        })?;
        let mut buf = vec![0u8; len];
        if buf.is_empty() {
            return Ok(buf);
        }
        self.file.seek(SeekFrom::Start(start))?;
        // A file that shrank since `open` surfaces as UnexpectedEof.
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// An in-memory buffer posing as a file.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl FileSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn slice(&mut self, start: u64, end: u64) -> Result<Vec<u8>, TransferError> {
        check_range(start, end, self.size())?;
        Ok(self.data[start as usize..end as usize].to_vec())
    }
}
