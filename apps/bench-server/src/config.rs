//! Server settings.
//!
//! Stored as TOML, `upbench-server.toml` in the working directory unless a
//! path is given on the command line. Every field has a default, so a
//! missing file or a partial one is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use upbench_metering::MeteringConfig;
use upbench_server::ConsumeMode;

/// Settings file looked up when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "upbench-server.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Socket address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// `discard` or `store`.
    #[serde(default)]
    pub consume: ConsumeMode,

    /// Object directory for `store` mode.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Metering bucket width in milliseconds.
    #[serde(default = "default_bucket_ms")]
    pub bucket_ms: u64,

    /// Metering CSV written after each body; empty disables it.
    #[serde(default = "default_stats_path")]
    pub stats_path: String,

    #[serde(default = "default_stats_separator")]
    pub stats_separator: char,

    /// Wait for a complete request head, in seconds.
    #[serde(default = "default_header_timeout_secs")]
    pub header_timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_bucket_ms() -> u64 {
    10
}

fn default_stats_path() -> String {
    "stats-server.csv".into()
}

fn default_stats_separator() -> char {
    ' '
}

fn default_header_timeout_secs() -> u64 {
    30
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            consume: ConsumeMode::default(),
            store_dir: default_store_dir(),
            bucket_ms: default_bucket_ms(),
            stats_path: default_stats_path(),
            stats_separator: default_stats_separator(),
            header_timeout_secs: default_header_timeout_secs(),
        }
    }
}

impl ServerSettings {
    /// Loads settings from `path`, or from [`DEFAULT_SETTINGS_FILE`] if it
    /// exists, or falls back to defaults.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let content = std::fs::read_to_string(&path)?;
        let settings: ServerSettings = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn metering(&self) -> MeteringConfig {
        MeteringConfig::with_bucket(Duration::from_millis(self.bucket_ms))
    }

    pub fn header_timeout(&self) -> Duration {
        Duration::from_secs(self.header_timeout_secs)
    }

    pub fn stats_path(&self) -> Option<PathBuf> {
        (!self.stats_path.is_empty()).then(|| PathBuf::from(&self.stats_path))
    }
}
