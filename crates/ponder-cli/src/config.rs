//! Configuration file support

use ponder_chat::FlushMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for ponder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat backend base URL
    pub server_url: Option<String>,
    /// Default model to use (falls back to the backend's default)
    pub model: Option<String>,
    /// Ask thinking models to stream their reasoning
    pub deep_thinking: Option<bool>,
    /// Let the backend search the web
    pub web_search: Option<bool>,
    /// How streamed text is published: "incremental" or "buffered"
    pub flush: Option<String>,
    /// Give up on a stream after this many seconds without data
    pub idle_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ponder")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PONDER_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            server_url: Some(ponder_stream::client::DEFAULT_BASE_URL.to_string()),
            model: None,
            deep_thinking: Some(true),
            web_search: Some(false),
            flush: Some("incremental".to_string()),
            idle_timeout_secs: Some(120),
        };

        default_config.save()?;
        Ok(path)
    }

    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| ponder_stream::client::DEFAULT_BASE_URL.to_string())
    }

    pub fn flush_mode(&self) -> FlushMode {
        match self.flush.as_deref().map(str::to_lowercase).as_deref() {
            Some("buffered") => FlushMode::Buffered,
            Some("incremental") | None => FlushMode::Incremental,
            Some(other) => {
                tracing::warn!("Unknown flush mode '{}', using incremental", other);
                FlushMode::Incremental
            }
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(120)),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# ponder configuration file
# Place at ~/.config/ponder/config.toml (Linux), ~/Library/Application Support/ponder/config.toml (macOS)
# or %APPDATA%\ponder\config.toml (Windows)

# Chat backend address
server_url = "http://127.0.0.1:5000"

# Model to use (defaults to the backend's default model)
# model = "qwen-plus"

# Stream reasoning from thinking models
deep_thinking = true

# Let the backend search the web
web_search = false

# "incremental" shows text as it arrives, "buffered" shows the reply once complete
flush = "incremental"

# Fail a reply after this many seconds without data (0 disables)
idle_timeout_secs = 120
"#
}
