//! Message envelope exchanged with the sandbox worker

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::SamplingConfig;

/// Storage layout handed to `module.init`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory backing the sandbox storage (fresh temporary directory when unset)
    pub storage_root: Option<PathBuf>,
}

/// Engine load parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Context window size (tokens)
    pub n_ctx: u32,
    /// Model location inside the sandbox storage (`/models/<name>`)
    pub model_path: String,
}

/// An operation the sandbox performs
#[derive(Debug, Clone)]
pub enum Action {
    /// Initialize the module: storage and runtime instance
    ModuleInit(PathConfig),
    /// Allocate a file of `size` bytes in sandbox storage
    FsAlloc { name: String, size: u64 },
    /// Write one frame at `offset`; the frame is owned by the message
    FsWrite {
        name: String,
        data: Bytes,
        offset: u64,
    },
    /// Start the engine runtime
    RuntimeStart,
    /// Load the stored model into the engine
    Load(LoadConfig),
    /// Configure sampling for the next completion
    SamplingInit(SamplingConfig),
    /// Generate a completion, streaming tokens before the reply
    Completion { prompt: String, max_tokens: u32 },
    /// Clear accumulated conversation context
    Reset,
    /// Stop the in-flight completion at the next fragment boundary
    Interrupt,
}

impl Action {
    /// Wire name of the action
    pub fn name(&self) -> &'static str {
        match self {
            Self::ModuleInit(_) => "module.init",
            Self::FsAlloc { .. } => "fs.alloc",
            Self::FsWrite { .. } => "fs.write",
            Self::RuntimeStart => "runtime.start",
            Self::Load(_) => "load",
            Self::SamplingInit(_) => "sampling.init",
            Self::Completion { .. } => "completion",
            Self::Reset => "reset",
            Self::Interrupt => "interrupt",
        }
    }
}

/// Correlated request sent to the sandbox
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique per channel, echoed by every response to this request
    pub correlation_id: u64,
    /// Operation to perform
    pub action: Action,
}

/// Failure reported by the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    /// Error carrying `message` back to the caller
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<crate::error::Error> for RemoteError {
    fn from(err: crate::error::Error) -> Self {
        use crate::error::Error;
        match err {
            Error::Inference(message) | Error::Internal(message) => Self::new(message),
            other => Self::new(other.to_string()),
        }
    }
}

/// Message emitted by the sandbox
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Final settlement of a request
    Reply {
        correlation_id: u64,
        outcome: Result<serde_json::Value, RemoteError>,
    },
    /// Incremental completion fragment; always precedes its reply
    Token { correlation_id: u64, text: String },
}

impl Response {
    /// Id of the request this response belongs to
    pub fn correlation_id(&self) -> u64 {
        match self {
            Self::Reply { correlation_id, .. } | Self::Token { correlation_id, .. } => {
                *correlation_id
            }
        }
    }
}
