//! Error types for the analyzer

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Closed classification of every failure the core can report.
///
/// Hosts use this to decide how to present a failure without inspecting
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unreachable document tree (always degraded, never fatal)
    Extraction,
    /// Module, storage or runtime initialization failure (fatal to the session)
    Load,
    /// Channel failure during a completion (recovered per chunk)
    Inference,
    /// Model output outside the tagged-finding grammar
    Format,
    /// A request was issued while another one is in flight
    Busy,
    /// The session is not in a state that accepts the request
    NotReady,
    /// The sandbox channel closed
    Channel,
    /// Invalid configuration
    Config,
    /// Local IO or serialization failure
    Io,
}

/// Analyzer errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document extraction failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// A step of the model loading sequence failed
    #[error("Model load failed during {stage}: {message}")]
    Load { stage: String, message: String },

    /// The engine reported a failure while generating
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Output did not follow the tagged-finding grammar
    #[error("Non-standard output format: {0}")]
    Format(String),

    /// Single-flight violation
    #[error("Session busy: {0}")]
    Busy(String),

    /// Request issued in the wrong lifecycle state
    #[error("Session not ready (state: {0:?})")]
    NotReady(SessionState),

    /// Sandbox channel closed or reply dropped
    #[error("Sandbox channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a load error for the given step
    pub fn load(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create an inference error
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Create a channel error
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map this error onto the closed taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::Toml(_) => ErrorKind::Config,
            Error::Extraction(_) => ErrorKind::Extraction,
            Error::Load { .. } => ErrorKind::Load,
            Error::Inference(_) | Error::Http(_) => ErrorKind::Inference,
            Error::Format(_) => ErrorKind::Format,
            Error::Busy(_) => ErrorKind::Busy,
            Error::NotReady(_) => ErrorKind::NotReady,
            Error::Channel(_) => ErrorKind::Channel,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => ErrorKind::Io,
        }
    }
}
