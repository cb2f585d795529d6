//! Engine capability hosted inside the sandbox

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::watch;

use crate::config::SamplingConfig;
use crate::error::Result;

/// Callback receiving each generated fragment in order
pub type TokenSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Trait for a local generation engine
///
/// Implementations:
/// - `OllamaRuntime`: local Ollama server fed with the stored model file
///
/// The runtime is owned by exactly one sandbox worker; calls never overlap.
#[async_trait]
pub trait LlmRuntime: Send {
    /// Start the engine
    async fn start(&mut self) -> Result<()>;

    /// Load a model file with the given context window
    async fn load(&mut self, model_file: &Path, n_ctx: u32) -> Result<()>;

    /// Configure sampling for subsequent completions
    async fn init_sampling(&mut self, config: &SamplingConfig) -> Result<()>;

    /// Generate a completion, reporting fragments through `on_token`.
    ///
    /// Generation stops at the next fragment boundary once `stop` flips to
    /// true. `None` means the engine produced no usable result.
    async fn complete(
        &mut self,
        prompt: &str,
        max_tokens: u32,
        on_token: TokenSink<'_>,
        stop: watch::Receiver<bool>,
    ) -> Result<Option<String>>;

    /// Drop accumulated conversation context, keeping the model loaded
    async fn reset(&mut self) -> Result<()>;

    /// Get runtime name for logging
    fn name(&self) -> &str;
}

/// Builds the runtime instance during `module.init`
pub trait RuntimeFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn LlmRuntime>>;
}

impl<F> RuntimeFactory for F
where
    F: Fn() -> Result<Box<dyn LlmRuntime>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn LlmRuntime>> {
        self()
    }
}
