//! `galileo-send`: upload one file to a Galileo WebSocket endpoint.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use galileo_client::{LocalFile, LogObserver, ObserverSet, UploadConfig, UploadOutcome, Uploader};
use galileo_transfer::FileSource;

#[derive(Debug, Parser)]
#[command(
    name = "galileo-send",
    version,
    about = "Upload a file over a server-paced WebSocket session"
)]
struct Cli {
    /// Upload endpoint, e.g. ws://nas.local:8080/upload.
    url: String,

    /// File to upload.
    file: PathBuf,

    /// Chunk size in bytes when the server does not ask for one.
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<u64>,

    /// Give up after this many seconds without a server message.
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Config file [default: ~/.config/galileo/config.json].
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log protocol details.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// File settings overridden by flags.
    fn upload_config(&self) -> anyhow::Result<UploadConfig> {
        let mut config = match &self.config {
            Some(path) => UploadConfig::load(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => UploadConfig::load_default(),
        };

        config.url = self.url.clone();
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = Some(chunk_size);
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_secs = Some(secs);
        }
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "info,galileo=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(UploadOutcome::Succeeded) => ExitCode::SUCCESS,
        Ok(UploadOutcome::Failed(_)) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<UploadOutcome> {
    let config = cli.upload_config()?;
    let uploader = Uploader::new(config)?;

    let mut source = LocalFile::open(&cli.file)
        .with_context(|| format!("cannot open {}", cli.file.display()))?;
    tracing::info!(
        file = %source.name(),
        size = source.size(),
        url = %uploader.config().url,
        "uploading"
    );

    let mut observer = ObserverSet::new().with(LogObserver::new(source.name(), 1));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, closing session");
            on_signal.cancel();
        }
    });

    let outcome = uploader
        .upload_with_cancel(&mut source, &mut observer, cancel)
        .await;

    match &outcome {
        UploadOutcome::Succeeded => println!("{}: uploaded", cli.file.display()),
        UploadOutcome::Failed(errors) => {
            let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
            println!("{}: failed: {}", cli.file.display(), reasons.join("; "));
        }
    }
    Ok(outcome)
}
