use galileo_protocol::{DEFAULT_CHUNK_SIZE, ErrorRecord, Handshake, MAX_CHUNK_SIZE, ServerSignal};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Something the transport driver must do, produced by a transition.
///
/// Actions are returned in the order they must be carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send the `{name, size}` handshake as a text frame.
    SendHandshake(Handshake),
    /// Read `[start, end)` from the file source and send it as a binary frame.
    SendChunk { start: u64, end: u64 },
    /// Send `{"finished": true}` as a text frame.
    SendCompletionAck,
    /// Report the completed ratio, in `[0, 1]`.
    Progress(f64),
    /// Report an error record as it arrives.
    Error(ErrorRecord),
    /// Close the transport.
    Close,
    /// Terminal: the upload succeeded.
    Succeeded,
    /// Terminal: the upload failed; carries every recorded error in order.
    Failed(Vec<ErrorRecord>),
}

/// Coarse protocol state, derived from the session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not open yet.
    Init,
    /// Handshake sent; waiting for the server to ask for data.
    AwaitReady,
    /// Every byte was sent; waiting for the server's close signal.
    AwaitFinalAck,
    /// A close was requested; inbound messages are no longer interpreted.
    Closing,
    Succeeded,
    Failed,
}

/// Final verdict of one session.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Succeeded,
    Failed(Vec<ErrorRecord>),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Succeeded)
    }
}

/// State of one upload attempt over one connection.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    name: String,
    total_size: u64,
    chunk_size: u64,
    cursor: u64,
    chunks_sent: u64,
    /// Set once the chunk reaching `total_size` was handed to the transport.
    finished: bool,
    /// Set only when a close signal arrives after `finished`.
    succeeded: bool,
    opened: bool,
    closing: bool,
    closed: bool,
    errors: Vec<ErrorRecord>,
}

impl Session {
    /// Creates a session for a file of `total_size` bytes.
    ///
    /// A missing or zero `chunk_size` falls back to [`DEFAULT_CHUNK_SIZE`];
    /// anything above [`MAX_CHUNK_SIZE`] is clamped to it.
    pub fn new(name: impl Into<String>, total_size: u64, chunk_size: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            total_size,
            chunk_size: chunk_size
                .filter(|&c| c > 0)
                .unwrap_or(DEFAULT_CHUNK_SIZE)
                .min(MAX_CHUNK_SIZE),
            cursor: 0,
            chunks_sent: 0,
            finished: false,
            succeeded: false,
            opened: false,
            closing: false,
            closed: false,
            errors: Vec::new(),
        }
    }

    /// The transport opened: announce the file.
    pub fn on_open(&mut self) -> Vec<Action> {
        if self.opened || self.closed {
            warn!(session = %self.id, "transport open reported twice, ignoring");
            return Vec::new();
        }
        self.opened = true;
        info!(session = %self.id, name = %self.name, size = self.total_size, "upload started");
        vec![Action::SendHandshake(Handshake {
            name: self.name.clone(),
            size: self.total_size,
        })]
    }

    /// A server message arrived.
    pub fn on_message(&mut self, signal: ServerSignal) -> Vec<Action> {
        if self.closed || self.closing {
            debug!(session = %self.id, kind = signal.kind(), "closing, message dropped");
            return Vec::new();
        }

        match signal {
            ServerSignal::Close => {
                if self.finished {
                    self.succeeded = true;
                }
                debug!(session = %self.id, finished = self.finished, "server sent close");
                vec![self.request_close()]
            }
            ServerSignal::Error(record) => self.record_error(record),
            ServerSignal::Ready { chunk_size } => self.on_ready(chunk_size),
            ServerSignal::Unknown(payload) => {
                warn!(session = %self.id, %payload, "ignoring unrecognized server message");
                Vec::new()
            }
        }
    }

    /// A client-side failure the server will never report (unreadable file,
    /// failed connect, idle timeout). Always fatal.
    pub fn on_local_error(&mut self, message: impl Into<String>) -> Vec<Action> {
        if self.closed {
            return Vec::new();
        }
        let record = ErrorRecord::local(message, true);
        if self.closing {
            // Close already under way; keep the diagnostic, skip the second close.
            self.errors.push(record.clone());
            return vec![Action::Error(record)];
        }
        self.record_error(record)
    }

    /// The transport closed, for whatever reason. Runs at most once.
    pub fn on_close(&mut self) -> Vec<Action> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.closing = true;

        if self.succeeded {
            info!(session = %self.id, chunks = self.chunks_sent, "upload succeeded");
            return vec![Action::Succeeded];
        }

        if self.errors.is_empty() {
            self.errors.push(ErrorRecord::unknown());
        }
        info!(
            session = %self.id,
            sent = self.cursor,
            size = self.total_size,
            errors = self.errors.len(),
            "upload failed"
        );
        vec![Action::Failed(self.errors.clone())]
    }

    fn on_ready(&mut self, requested: Option<u64>) -> Vec<Action> {
        if self.finished {
            debug!(session = %self.id, "ready after last chunk, acknowledging completion");
            return vec![Action::SendCompletionAck];
        }

        let size = match requested.filter(|&c| c > 0) {
            Some(c) if c > MAX_CHUNK_SIZE => {
                warn!(session = %self.id, requested = c, "requested chunk too large, clamping");
                MAX_CHUNK_SIZE
            }
            Some(c) => c,
            None => self.chunk_size,
        };
        let start = self.cursor;
        let end = start.saturating_add(size).min(self.total_size);
        if end == self.total_size {
            self.finished = true;
        }
        self.cursor = end;
        self.chunks_sent += 1;

        let ratio = self.ratio();
        debug!(session = %self.id, start, end, ratio, "sending chunk");
        vec![Action::SendChunk { start, end }, Action::Progress(ratio)]
    }

    fn record_error(&mut self, record: ErrorRecord) -> Vec<Action> {
        warn!(session = %self.id, error = %record, "upload error reported");
        self.errors.push(record.clone());
        let fatal = record.fatal;
        let mut actions = vec![Action::Error(record)];
        if fatal {
            actions.push(self.request_close());
        }
        actions
    }

    fn request_close(&mut self) -> Action {
        self.closing = true;
        Action::Close
    }

    fn ratio(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            self.cursor as f64 / self.total_size as f64
        }
    }

    /// Session identifier used in log fields.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Default chunk size for ready signals that do not ask for one.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Offset of the next unsent byte.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_succeeded(&self) -> bool {
        self.succeeded
    }

    /// `true` once a close was requested or the transport closed.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn state(&self) -> SessionState {
        match (self.closed, self.closing) {
            (true, _) if self.succeeded => SessionState::Succeeded,
            (true, _) => SessionState::Failed,
            (false, true) => SessionState::Closing,
            _ if !self.opened => SessionState::Init,
            _ if self.finished => SessionState::AwaitFinalAck,
            _ => SessionState::AwaitReady,
        }
    }

    /// The verdict, available once the transport closed.
    pub fn outcome(&self) -> Option<UploadOutcome> {
        if !self.closed {
            return None;
        }
        Some(if self.succeeded {
            UploadOutcome::Succeeded
        } else {
            UploadOutcome::Failed(self.errors.clone())
        })
    }
}
