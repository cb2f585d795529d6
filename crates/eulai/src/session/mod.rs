//! Sandboxed generation session
//!
//! The engine lives in an isolated worker task and is reachable only through
//! correlated request/response messages. `SessionManager` owns the caller side
//! of that channel and the lifecycle state machine.

pub mod manager;
pub mod protocol;
pub mod sandbox;
pub mod source;
pub mod storage;

use serde::{Deserialize, Serialize};

pub use manager::SessionManager;
pub use protocol::{Action, LoadConfig, PathConfig, RemoteError, Request, Response};
pub use sandbox::{Sandbox, SandboxChannel};
pub use source::{open_source, BytesSource, FileSource, HttpSource, ModelSource};
pub use storage::SandboxStorage;

/// Text substituted when the sandbox resolves a completion without a result
pub const DEGRADED_COMPLETION_TEXT: &str = "Internal generation error.";

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, nothing loaded yet
    Uninitialized,
    /// Model transfer and engine start in progress
    Loading,
    /// Idle and accepting requests
    Ready,
    /// A request is in flight
    Busy,
    /// Terminal: a load step failed or the sandbox channel closed
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Settled result of one completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Full generated text
    pub text: String,
    /// True when the sandbox produced no usable result
    pub degraded: bool,
}

impl Completion {
    /// Completion carrying generated text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            degraded: false,
        }
    }

    /// Placeholder for a reply without a result
    pub fn degraded() -> Self {
        Self {
            text: DEGRADED_COMPLETION_TEXT.to_string(),
            degraded: true,
        }
    }
}
