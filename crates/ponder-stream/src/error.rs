//! Error types for ponder-stream

use thiserror::Error;

/// Result type alias using ponder-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request or body read failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed outside of stream frames
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stream frame could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The stream ended or stalled before a terminal event
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// How a failed stream is classified for display and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network or read failure before a terminal event
    Transport,
    /// Malformed frame payload
    Protocol,
    /// The service reported an error event
    Application,
}

impl Error {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Classify this error for stream failure handling.
    ///
    /// A bad status on dispatch counts as transport: the stream never opened.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Protocol(_) | Error::Json(_) => FailureKind::Protocol,
            Error::Http(_) | Error::Transport(_) | Error::Api { .. } | Error::InvalidConfig(_) => {
                FailureKind::Transport
            }
        }
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Protocol => "protocol",
            FailureKind::Application => "application",
        }
    }
}
