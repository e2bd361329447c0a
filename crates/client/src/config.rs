//! Upload configuration.
//!
//! Can be built in code or read from a JSON file, by default
//! `~/.config/galileo/config.json`:
//!
//! ```json
//! { "url": "ws://nas.local:8080/upload", "chunk_size": 1048576, "idle_timeout_secs": 60 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use galileo_protocol::constants::WS_MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Settings for one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Server endpoint, `ws://` or `wss://`.
    pub url: String,

    /// Default chunk size; missing or zero means
    /// [`DEFAULT_CHUNK_SIZE`](galileo_protocol::DEFAULT_CHUNK_SIZE).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,

    /// Close the session if the server stays silent this long.
    /// `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,

    /// Largest inbound WebSocket message accepted.
    pub max_message_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            chunk_size: None,
            idle_timeout_secs: None,
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

impl UploadConfig {
    /// Config for `url` with every other field defaulted.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }

    /// Checks the URL scheme.
    pub fn validate(&self) -> Result<(), ClientError> {
        let lower = self.url.to_ascii_lowercase();
        let rest = lower
            .strip_prefix("ws://")
            .or_else(|| lower.strip_prefix("wss://"));
        match rest {
            Some(host) if !host.is_empty() => Ok(()),
            _ => Err(ClientError::InvalidUrl(self.url.clone())),
        }
    }

    /// Reads a config file. Fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Reads the default config file if it exists.
    ///
    /// A missing file gives the defaults; an unreadable or malformed one is
    /// logged and also gives the defaults.
    pub fn load_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "configuration loaded");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "failed to read config, using defaults: {e}"
                );
                Self::default()
            }
        }
    }
}

/// `galileo/config.json` under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    config_base_dir().map(|d| d.join("galileo").join("config.json"))
}

fn config_base_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(xdg));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    }
}
