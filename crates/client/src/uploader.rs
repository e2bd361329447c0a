//! Upload driver: runs one [`Session`] over one WebSocket connection.
//!
//! The driver is the session's only caller. It reads one inbound frame at
//! a time, runs the transition and carries out every returned action
//! before reading the next frame. Outbound frames go through the write
//! pump, which keeps them in send order.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use galileo_protocol::constants::CLOSE_HANDSHAKE_TIMEOUT;
use galileo_protocol::{CompletionAck, ServerSignal};
use galileo_transfer::{Action, FileSource, Session, UploadObserver, UploadOutcome, notify};

use crate::config::UploadConfig;
use crate::error::ClientError;

/// Uploads files to one server endpoint, one session per call.
#[derive(Debug, Clone)]
pub struct Uploader {
    config: UploadConfig,
}

impl Uploader {
    /// Creates an uploader after validating `config`.
    pub fn new(config: UploadConfig) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `source`, reporting to `observer`. Never fails outright:
    /// every problem ends up in the returned outcome and in
    /// [`UploadObserver::on_failure`].
    pub async fn upload(
        &self,
        source: &mut dyn FileSource,
        observer: &mut dyn UploadObserver,
    ) -> UploadOutcome {
        self.upload_with_cancel(source, observer, CancellationToken::new())
            .await
    }

    /// Like [`upload`](Self::upload), but cancelling `cancel` closes the
    /// connection and fails the session.
    pub async fn upload_with_cancel(
        &self,
        source: &mut dyn FileSource,
        observer: &mut dyn UploadObserver,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        let mut session = Session::new(source.name(), source.size(), self.config.chunk_size);

        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);

        let connect = tokio_tungstenite::connect_async_with_config(
            self.config.url.as_str(),
            Some(ws_config),
            false,
        );
        let ws_stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("upload cancelled before connecting".to_string()),
            result = connect => result
                .map(|(ws, _)| ws)
                .map_err(|e| format!("connection failed: {}", ClientError::from(e))),
        };

        let ws_stream = match ws_stream {
            Ok(ws) => ws,
            Err(reason) => {
                warn!(session = %session.id(), url = %self.config.url, "{reason}");
                let mut actions = session.on_local_error(reason);
                actions.extend(session.on_close());
                for action in &actions {
                    notify(observer, action);
                }
                return finish(&session);
            }
        };
        debug!(session = %session.id(), url = %self.config.url, "connected");

        let (write, read) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(16);
        let pump_cancel = CancellationToken::new();
        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            write,
            write_rx,
            pump_cancel.clone(),
        ));

        let options = DriveOptions {
            idle_timeout: self.config.idle_timeout(),
            close_timeout: CLOSE_HANDSHAKE_TIMEOUT,
        };
        let outcome = drive(
            &mut session,
            read,
            write_tx,
            source,
            observer,
            &options,
            cancel,
        )
        .await;

        pump_cancel.cancel();
        let _ = write_handle.await;
        outcome
    }
}

fn finish(session: &Session) -> UploadOutcome {
    // `drive` always ends with `on_close`, so the outcome is set.
    session
        .outcome()
        .unwrap_or_else(|| UploadOutcome::Failed(session.errors().to_vec()))
}

/// Timing knobs for [`drive`].
#[derive(Debug, Clone)]
pub(crate) struct DriveOptions {
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) close_timeout: Duration,
}

/// What the read side saw.
enum Inbound {
    Signal(ServerSignal),
    /// A frame that carries no signal (ping, pong, binary, non-JSON text).
    Ignored,
    Closed,
}

/// Runs the session until the transport closes and returns its verdict.
pub(crate) async fn drive<R>(
    session: &mut Session,
    mut read: R,
    write_tx: mpsc::Sender<tungstenite::Message>,
    source: &mut dyn FileSource,
    observer: &mut dyn UploadObserver,
    options: &DriveOptions,
    cancel: CancellationToken,
) -> UploadOutcome
where
    R: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let mut exec = Executor {
        write_tx: &write_tx,
        source,
        observer,
    };

    let opened = session.on_open();
    exec.run(session, opened).await;

    let idle_deadline = tokio::time::sleep(options.idle_timeout.unwrap_or(options.close_timeout));
    tokio::pin!(idle_deadline);
    let close_deadline = tokio::time::sleep(options.close_timeout);
    tokio::pin!(close_deadline);
    let mut close_armed = false;

    loop {
        if session.is_closing() && !close_armed {
            close_deadline
                .as_mut()
                .reset(tokio::time::Instant::now() + options.close_timeout);
            close_armed = true;
        }

        let inbound = tokio::select! {
            biased;

            _ = cancel.cancelled(), if !session.is_closing() => {
                info!(session = %session.id(), "upload cancelled");
                let actions = session.on_local_error("upload cancelled");
                exec.run(session, actions).await;
                continue;
            }

            () = &mut idle_deadline, if options.idle_timeout.is_some() && !session.is_closing() => {
                let secs = options.idle_timeout.map(|d| d.as_secs()).unwrap_or_default();
                warn!(session = %session.id(), secs, "server idle, closing");
                let actions = session.on_local_error(format!("no message from server for {secs}s"));
                exec.run(session, actions).await;
                continue;
            }

            () = &mut close_deadline, if close_armed => {
                warn!(session = %session.id(), "server did not finish the close handshake");
                Inbound::Closed
            }

            msg = read.next() => classify(msg, &write_tx).await,
        };

        if matches!(inbound, Inbound::Closed) {
            break;
        }

        // Any frame from the server counts as activity, keepalives included.
        if let Some(timeout) = options.idle_timeout {
            idle_deadline
                .as_mut()
                .reset(tokio::time::Instant::now() + timeout);
        }

        if let Inbound::Signal(signal) = inbound {
            trace!(session = %session.id(), kind = signal.kind(), "received signal");
            let actions = session.on_message(signal);
            exec.run(session, actions).await;
        }
    }

    let closed = session.on_close();
    exec.run(session, closed).await;
    finish(session)
}

/// Turns one read result into a session input.
async fn classify(
    msg: Option<Result<tungstenite::Message, tungstenite::Error>>,
    write_tx: &mpsc::Sender<tungstenite::Message>,
) -> Inbound {
    match msg {
        Some(Ok(tungstenite::Message::Text(text))) => match ServerSignal::decode(&text) {
            Ok(signal) => Inbound::Signal(signal),
            Err(e) => {
                warn!("ignoring non-JSON text frame: {e}");
                Inbound::Ignored
            }
        },
        Some(Ok(tungstenite::Message::Binary(data))) => {
            warn!(len = data.len(), "ignoring unexpected binary frame");
            Inbound::Ignored
        }
        Some(Ok(tungstenite::Message::Ping(data))) => {
            trace!("received ping, sending pong");
            let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
            Inbound::Ignored
        }
        Some(Ok(tungstenite::Message::Close(frame))) => {
            debug!(?frame, "received close frame");
            Inbound::Closed
        }
        Some(Ok(_)) => Inbound::Ignored,
        Some(Err(e)) => {
            warn!("WebSocket read error: {e}");
            Inbound::Closed
        }
        None => {
            debug!("WebSocket stream ended");
            Inbound::Closed
        }
    }
}

/// Carries out session actions against the transport and the observer.
struct Executor<'a> {
    write_tx: &'a mpsc::Sender<tungstenite::Message>,
    source: &'a mut dyn FileSource,
    observer: &'a mut dyn UploadObserver,
}

impl Executor<'_> {
    async fn run(&mut self, session: &mut Session, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            if notify(self.observer, &action) {
                continue;
            }
            if let Err(e) = self.send(&action).await {
                warn!(session = %session.id(), "failed to send: {e}");
                // The rest of this batch assumed the send went through.
                queue.clear();
                queue.extend(session.on_local_error(e.to_string()));
            }
        }
    }

    async fn send(&mut self, action: &Action) -> Result<(), ClientError> {
        let frame = match action {
            Action::SendHandshake(handshake) => {
                tungstenite::Message::Text(handshake.to_json()?.into())
            }
            Action::SendChunk { start, end } => {
                let data = self.source.slice(*start, *end)?;
                tungstenite::Message::Binary(data.into())
            }
            Action::SendCompletionAck => {
                tungstenite::Message::Text(CompletionAck::default().to_json()?.into())
            }
            Action::Close => {
                // The peer may already be gone; the read side notices.
                let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            Action::Progress(_) | Action::Error(_) | Action::Succeeded | Action::Failed(_) => {
                return Ok(());
            }
        };
        self.write_tx
            .send(frame)
            .await
            .map_err(|_| ClientError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use futures_util::stream;
    use galileo_protocol::ErrorRecord;
    use galileo_transfer::{Callbacks, MemorySource};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(serde_json::Value),
        Binary(Vec<u8>),
        Pong,
        Close,
    }

    #[derive(Debug, Default)]
    struct Record {
        progress: Vec<f64>,
        errors: Vec<String>,
        success: usize,
        failures: Vec<Vec<ErrorRecord>>,
    }

    fn recording_observer(rec: &Arc<Mutex<Record>>) -> Callbacks {
        let (a, b, c, d) = (rec.clone(), rec.clone(), rec.clone(), rec.clone());
        Callbacks::new()
            .on_progress(move |r| a.lock().unwrap().progress.push(r))
            .on_error(move |e| b.lock().unwrap().errors.push(e.message.clone()))
            .on_success(move || c.lock().unwrap().success += 1)
            .on_failure(move |errs| d.lock().unwrap().failures.push(errs.to_vec()))
    }

    fn text(json: &str) -> Result<tungstenite::Message, tungstenite::Error> {
        Ok(tungstenite::Message::Text(json.to_string().into()))
    }

    fn drain_sent(rx: &mut mpsc::Receiver<tungstenite::Message>) -> Vec<Sent> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(match msg {
                tungstenite::Message::Text(t) => Sent::Text(serde_json::from_str(&t).unwrap()),
                tungstenite::Message::Binary(b) => Sent::Binary(b.to_vec()),
                tungstenite::Message::Pong(_) => Sent::Pong,
                tungstenite::Message::Close(_) => Sent::Close,
                other => panic!("unexpected frame {other:?}"),
            });
        }
        out
    }

    fn options() -> DriveOptions {
        DriveOptions {
            idle_timeout: None,
            close_timeout: Duration::from_secs(5),
        }
    }

    /// Runs a session against a scripted server; the stream ends after the
    /// last scripted frame.
    async fn run_scripted(
        data: &[u8],
        chunk_size: u64,
        script: Vec<Result<tungstenite::Message, tungstenite::Error>>,
    ) -> (UploadOutcome, Vec<Sent>, Record) {
        let mut source = MemorySource::new("data.bin", data.to_vec());
        let mut session = Session::new(source.name(), source.size(), Some(chunk_size));
        let rec = Arc::new(Mutex::new(Record::default()));
        let mut observer = recording_observer(&rec);
        let (write_tx, mut write_rx) = mpsc::channel(256);

        let outcome = drive(
            &mut session,
            stream::iter(script),
            write_tx,
            &mut source,
            &mut observer,
            &options(),
            CancellationToken::new(),
        )
        .await;

        let sent = drain_sent(&mut write_rx);
        drop(observer);
        let record = Arc::try_unwrap(rec).unwrap().into_inner().unwrap();
        (outcome, sent, record)
    }

    #[tokio::test]
    async fn full_upload_succeeds() {
        let data: Vec<u8> = (0..10u8).collect();
        let script = vec![
            text(r#"{"ready":true}"#),
            text(r#"{"ready":true}"#),
            text(r#"{"ready":true}"#),
            text(r#"{"ready":true}"#),
            text(r#"{"close":true}"#),
            Ok(tungstenite::Message::Close(None)),
        ];

        let (outcome, sent, record) = run_scripted(&data, 4, script).await;

        assert_eq!(outcome, UploadOutcome::Succeeded);
        assert_eq!(
            sent,
            vec![
                Sent::Text(serde_json::json!({"name": "data.bin", "size": 10})),
                Sent::Binary(vec![0, 1, 2, 3]),
                Sent::Binary(vec![4, 5, 6, 7]),
                Sent::Binary(vec![8, 9]),
                Sent::Text(serde_json::json!({"finished": true})),
                Sent::Close,
            ]
        );
        assert_eq!(record.progress, vec![0.4, 0.8, 1.0]);
        assert_eq!(record.success, 1);
        assert!(record.failures.is_empty());
    }

    #[tokio::test]
    async fn stream_end_before_finish_fails_with_unknown_error() {
        let script = vec![text(r#"{"ready":true}"#)];
        let (outcome, sent, record) = run_scripted(&[7u8; 8], 4, script).await;

        assert_eq!(outcome, UploadOutcome::Failed(vec![ErrorRecord::unknown()]));
        assert_eq!(sent.len(), 2);
        assert_eq!(record.success, 0);
        assert_eq!(record.failures, vec![vec![ErrorRecord::unknown()]]);
    }

    #[tokio::test]
    async fn fatal_error_stops_pacing() {
        let script = vec![
            text(r#"{"ready":true}"#),
            text(r#"{"error":"disk full","fatal":true}"#),
            text(r#"{"ready":true}"#),
            Ok(tungstenite::Message::Close(None)),
        ];
        let (outcome, sent, record) = run_scripted(&[1u8; 100], 10, script).await;

        let chunks = sent.iter().filter(|s| matches!(s, Sent::Binary(_))).count();
        assert_eq!(chunks, 1);
        assert_eq!(sent.last(), Some(&Sent::Close));
        assert_eq!(record.errors, vec!["disk full"]);
        match outcome {
            UploadOutcome::Failed(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].fatal);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn noise_frames_are_ignored() {
        let script = vec![
            text("definitely not json"),
            Ok(tungstenite::Message::Binary(vec![9, 9].into())),
            Ok(tungstenite::Message::Ping(vec![1].into())),
            text(r#"{"status":"warming up"}"#),
            text(r#"{"ready":true}"#),
            text(r#"{"close":true}"#),
        ];
        let (outcome, sent, _) = run_scripted(b"abc", 10, script).await;

        assert!(outcome.is_success());
        assert!(sent.contains(&Sent::Pong));
        assert!(sent.contains(&Sent::Binary(b"abc".to_vec())));
    }

    #[tokio::test]
    async fn read_error_closes_session() {
        let script = vec![
            text(r#"{"ready":true}"#),
            Err(tungstenite::Error::ConnectionClosed),
            text(r#"{"ready":true}"#),
        ];
        let (outcome, sent, _) = run_scripted(&[0u8; 20], 10, script).await;

        assert!(!outcome.is_success());
        let chunks = sent.iter().filter(|s| matches!(s, Sent::Binary(_))).count();
        assert_eq!(chunks, 1);
    }

    /// A source whose reads always fail.
    struct BrokenSource;

    impl FileSource for BrokenSource {
        fn name(&self) -> &str {
            "broken.bin"
        }

        fn size(&self) -> u64 {
            100
        }

        fn slice(
            &mut self,
            _start: u64,
            _end: u64,
        ) -> Result<Vec<u8>, galileo_transfer::TransferError> {
            Err(std::io::Error::other("bad sector").into())
        }
    }

    #[tokio::test]
    async fn unreadable_source_fails_locally() {
        let mut source = BrokenSource;
        let mut session = Session::new(source.name(), source.size(), Some(10));
        let rec = Arc::new(Mutex::new(Record::default()));
        let mut observer = recording_observer(&rec);
        let (write_tx, mut write_rx) = mpsc::channel(16);

        let script = vec![text(r#"{"ready":true}"#), text(r#"{"ready":true}"#)];
        let outcome = drive(
            &mut session,
            stream::iter(script),
            write_tx,
            &mut source,
            &mut observer,
            &options(),
            CancellationToken::new(),
        )
        .await;

        let sent = drain_sent(&mut write_rx);
        assert_eq!(sent.len(), 2, "handshake then close: {sent:?}");
        assert_eq!(sent[1], Sent::Close);

        let record = rec.lock().unwrap();
        // No progress for a chunk that never went out.
        assert!(record.progress.is_empty());
        assert_eq!(record.errors.len(), 1);
        assert!(record.errors[0].contains("bad sector"));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn cancel_closes_and_fails() {
        tokio::time::pause();

        let mut source = MemorySource::new("f", vec![0u8; 10]);
        let mut session = Session::new(source.name(), source.size(), None);
        let mut observer = Callbacks::new().on_failure(|_| {});
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        // The server never answers; the close deadline ends the session.
        let outcome = drive(
            &mut session,
            stream::pending::<Result<tungstenite::Message, tungstenite::Error>>(),
            write_tx,
            &mut source,
            &mut observer,
            &options(),
            cancel,
        )
        .await;

        match outcome {
            UploadOutcome::Failed(errors) => assert_eq!(errors[0].message, "upload cancelled"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(drain_sent(&mut write_rx).last(), Some(&Sent::Close));
    }

    #[tokio::test]
    async fn idle_timeout_closes_silent_session() {
        tokio::time::pause();

        let mut source = MemorySource::new("f", vec![0u8; 10]);
        let mut session = Session::new(source.name(), source.size(), None);
        let mut observer = Callbacks::new().on_failure(|_| {});
        let (write_tx, _write_rx) = mpsc::channel(16);
        let opts = DriveOptions {
            idle_timeout: Some(Duration::from_secs(30)),
            close_timeout: Duration::from_secs(5),
        };

        let outcome = drive(
            &mut session,
            stream::pending::<Result<tungstenite::Message, tungstenite::Error>>(),
            write_tx,
            &mut source,
            &mut observer,
            &opts,
            CancellationToken::new(),
        )
        .await;

        match outcome {
            UploadOutcome::Failed(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].message.contains("30s"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn keepalive_pings_hold_off_idle_timeout() {
        tokio::time::pause();

        // Pings at 20s and 40s, the first ready at 45s: never 30s of silence.
        let script: Vec<(u64, Result<tungstenite::Message, tungstenite::Error>)> = vec![
            (20, Ok(tungstenite::Message::Ping(vec![1].into()))),
            (20, Ok(tungstenite::Message::Ping(vec![2].into()))),
            (5, text(r#"{"ready":true}"#)),
            (0, text(r#"{"close":true}"#)),
            (0, Ok(tungstenite::Message::Close(None))),
        ];
        let server = Box::pin(stream::iter(script).then(|(delay, msg)| async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            msg
        }));

        let mut source = MemorySource::new("f", b"payload".to_vec());
        let mut session = Session::new(source.name(), source.size(), None);
        let mut observer = Callbacks::new().on_failure(|_| {});
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let opts = DriveOptions {
            idle_timeout: Some(Duration::from_secs(30)),
            close_timeout: Duration::from_secs(5),
        };

        let outcome = drive(
            &mut session,
            server,
            write_tx,
            &mut source,
            &mut observer,
            &opts,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, UploadOutcome::Succeeded);
        let sent = drain_sent(&mut write_rx);
        assert_eq!(sent.iter().filter(|s| **s == Sent::Pong).count(), 2);
        assert!(sent.contains(&Sent::Binary(b"payload".to_vec())));
    }

    #[tokio::test]
    async fn unreachable_server_reports_failure() {
        // Port 9 on localhost is almost never listening.
        let uploader = Uploader::new(UploadConfig::new("ws://127.0.0.1:9/upload")).unwrap();
        let mut source = MemorySource::new("f", vec![1u8; 4]);
        let rec = Arc::new(Mutex::new(Record::default()));
        let mut observer = recording_observer(&rec);

        let outcome = uploader.upload(&mut source, &mut observer).await;

        assert!(!outcome.is_success());
        let record = rec.lock().unwrap();
        assert_eq!(record.failures.len(), 1);
        let message = &record.failures[0][0].message;
        assert!(message.starts_with("connection failed: WebSocket error:"), "{message}");
    }

    #[test]
    fn uploader_rejects_bad_url() {
        assert!(matches!(
            Uploader::new(UploadConfig::new("http://example.org")),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
