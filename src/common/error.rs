//! Error types for the application.

use thiserror::Error;

use crate::common::types::ChatId;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Errors reported by a chat platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Telegram file download failed: {0}")]
    Download(#[from] teloxide::DownloadError),

    #[error("Discord request failed: {0}")]
    Discord(#[from] serenity::Error),

    #[error("Unexpected platform response: {message}")]
    Unexpected { message: String },

    #[error("Event sink closed")]
    SinkClosed,
}

/// Fatal startup failures. The ready signal is never produced.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Could not determine own bot identity: {0}")]
    Identity(#[source] PlatformError),

    #[error("Failed to drain stale backlog: {0}")]
    Backlog(#[source] PlatformError),

    #[error("Continuous retrieval stopped: {0}")]
    Retrieval(#[source] PlatformError),
}

/// Non-fatal startup problems. Only ever logged.
#[derive(Debug, Error)]
pub enum StartupWarning {
    #[error("Failed to register bot commands: {0}")]
    Registration(#[source] PlatformError),

    #[error("Failed to set default administrator rights for {scope}: {source}")]
    Permissions {
        scope: &'static str,
        #[source]
        source: PlatformError,
    },

    #[error("Failed to fetch registered commands: {0}")]
    Verification(#[source] PlatformError),

    #[error("Registered commands {actual:?} do not match expected {expected:?}")]
    CommandMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

/// Failure inside a pipeline stage. The current event is dropped.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to reply in chat {chat_id}: {source}")]
    Reply {
        chat_id: ChatId,
        #[source]
        source: PlatformError,
    },
}

/// Per-bridge delivery failure. Other bridges of the same event are unaffected.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery to bridge '{bridge}' failed: {source}")]
    Send {
        bridge: String,
        #[source]
        source: PlatformError,
    },

    #[error("Edit on bridge '{bridge}' failed: {source}")]
    Edit {
        bridge: String,
        #[source]
        source: PlatformError,
    },
}

/// Result type alias for platform operations.
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;
