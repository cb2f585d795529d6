//! Generation engine abstractions
//!
//! The sandbox hosts any `LlmRuntime`; Ollama is the bundled backend.

pub mod llm;
pub mod ollama;

pub use llm::{LlmRuntime, RuntimeFactory, TokenSink};
pub use ollama::OllamaRuntime;
