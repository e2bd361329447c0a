//! Progress and result notifications.

use galileo_protocol::ErrorRecord;
use tracing::{error, info, warn};

use crate::session::Action;

/// Receives the notifications of one upload session.
///
/// Calls happen synchronously on the task driving the transport, in
/// protocol order. Success and failure are required so that a caller
/// always decides what a failed upload means.
pub trait UploadObserver: Send {
    /// Completed ratio after a chunk was handed to the transport.
    fn on_progress(&mut self, _ratio: f64) {}

    /// An error record, as soon as it is reported.
    fn on_error(&mut self, _record: &ErrorRecord) {}

    /// The server confirmed the upload. Called at most once.
    fn on_success(&mut self);

    /// The session ended without success; `errors` is never empty.
    /// Called at most once.
    fn on_failure(&mut self, errors: &[ErrorRecord]);
}

/// Forwards a notification action to `observer`.
///
/// Returns `false` for actions that are not notifications.
pub fn notify(observer: &mut dyn UploadObserver, action: &Action) -> bool {
    match action {
        Action::Progress(ratio) => observer.on_progress(*ratio),
        Action::Error(record) => observer.on_error(record),
        Action::Succeeded => observer.on_success(),
        Action::Failed(errors) => observer.on_failure(errors),
        Action::SendHandshake(_)
        | Action::SendChunk { .. }
        | Action::SendCompletionAck
        | Action::Close => return false,
    }
    true
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

type ProgressFn = Box<dyn FnMut(f64) + Send>;
type ErrorFn = Box<dyn FnMut(&ErrorRecord) + Send>;
type SuccessFn = Box<dyn FnMut() + Send>;
type FailureFn = Box<dyn FnMut(&[ErrorRecord]) + Send>;

/// Closure-based observer.
///
/// Every slot is optional. Without a failure handler the error list goes
/// to the log instead of disappearing.
#[derive(Default)]
pub struct Callbacks {
    progress: Option<ProgressFn>,
    error: Option<ErrorFn>,
    success: Option<SuccessFn>,
    failure: Option<FailureFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ErrorRecord) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnMut(&[ErrorRecord]) + Send + 'static) -> Self {
        self.failure = Some(Box::new(f));
        self
    }
}

impl UploadObserver for Callbacks {
    fn on_progress(&mut self, ratio: f64) {
        if let Some(cb) = self.progress.as_mut() {
            cb(ratio);
        }
    }

    fn on_error(&mut self, record: &ErrorRecord) {
        if let Some(cb) = self.error.as_mut() {
            cb(record);
        }
    }

    fn on_success(&mut self) {
        if let Some(cb) = self.success.as_mut() {
            cb();
        }
    }

    fn on_failure(&mut self, errors: &[ErrorRecord]) {
        match self.failure.as_mut() {
            Some(cb) => cb(errors),
            None => log_failure(errors),
        }
    }
}

fn log_failure(errors: &[ErrorRecord]) {
    for (i, record) in errors.iter().enumerate() {
        error!(index = i, fatal = record.fatal, raw = %record.raw, "upload failed: {}", record.message);
    }
}

// ---------------------------------------------------------------------------
// ObserverSet
// ---------------------------------------------------------------------------

/// Fans every notification out to several observers, in registration order.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn UploadObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl UploadObserver + 'static) -> Self {
        self.push(observer);
        self
    }

    pub fn push(&mut self, observer: impl UploadObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl UploadObserver for ObserverSet {
    fn on_progress(&mut self, ratio: f64) {
        for o in &mut self.observers {
            o.on_progress(ratio);
        }
    }

    fn on_error(&mut self, record: &ErrorRecord) {
        for o in &mut self.observers {
            o.on_error(record);
        }
    }

    fn on_success(&mut self) {
        for o in &mut self.observers {
            o.on_success();
        }
    }

    fn on_failure(&mut self, errors: &[ErrorRecord]) {
        for o in &mut self.observers {
            o.on_failure(errors);
        }
    }
}

// ---------------------------------------------------------------------------
// LogObserver
// ---------------------------------------------------------------------------

/// Writes every notification to the log.
///
/// Progress is logged each time the completed percentage crosses a new
/// multiple of `step_percent`.
#[derive(Debug)]
pub struct LogObserver {
    name: String,
    step_percent: u32,
    last_logged: Option<u32>,
}

impl LogObserver {
    pub fn new(name: impl Into<String>, step_percent: u32) -> Self {
        Self {
            name: name.into(),
            step_percent: step_percent.max(1),
            last_logged: None,
        }
    }
}

impl UploadObserver for LogObserver {
    fn on_progress(&mut self, ratio: f64) {
        let percent = (ratio.clamp(0.0, 1.0) * 100.0).floor() as u32;
        let bucket = percent / self.step_percent;
        if self.last_logged.is_none_or(|last| bucket > last) {
            self.last_logged = Some(bucket);
            info!(file = %self.name, percent, "upload progress");
        }
    }

    fn on_error(&mut self, record: &ErrorRecord) {
        warn!(file = %self.name, fatal = record.fatal, "server reported error: {}", record.message);
    }

    fn on_success(&mut self) {
        info!(file = %self.name, "upload complete");
    }

    fn on_failure(&mut self, errors: &[ErrorRecord]) {
        log_failure(errors);
    }
}
