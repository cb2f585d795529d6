//! Configuration for the analyzer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Placeholder the prompt template must contain
pub const CHUNK_PLACEHOLDER: &str = "{chunk}";

/// Main analyzer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EulaiConfig {
    /// Text segmentation configuration
    pub segmentation: SegmentationConfig,
    /// Sandbox session configuration
    pub session: SessionConfig,
    /// Sampling configuration sent before each completion
    pub sampling: SamplingConfig,
    /// Analysis loop configuration
    pub analysis: AnalysisConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Additional exclusion rules for extraction
    pub extraction: ExtractionConfig,
}

impl EulaiConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        tracing::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Default location of the user configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eulai").join("config.toml"))
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.segmentation.max_chunk_chars == 0 {
            return Err(Error::Config("segmentation.max_chunk_chars must be > 0".into()));
        }
        if self.session.frame_size == 0 {
            return Err(Error::Config("session.frame_size must be > 0".into()));
        }
        if self.session.n_ctx == 0 {
            return Err(Error::Config("session.n_ctx must be > 0".into()));
        }
        if !self.analysis.prompt_template.contains(CHUNK_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "analysis.prompt_template must contain {}",
                CHUNK_PLACEHOLDER
            )));
        }
        Ok(())
    }
}

/// Text segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Maximum chunk size in characters
    pub max_chunk_chars: usize,
    /// Boundaries at or before this offset are ignored
    pub min_cut: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2000,
            min_cut: 100,
        }
    }
}

/// Sandbox session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Context window size (tokens)
    pub n_ctx: u32,
    /// File name the model payload is stored under inside the sandbox
    pub model_name: String,
    /// Size of each transferred model frame in bytes
    pub frame_size: usize,
    /// Sandbox storage directory (a temporary directory when unset)
    pub storage_root: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            n_ctx: 2048,
            model_name: "model.gguf".to_string(),
            frame_size: 1024 * 1024, // 1MB
            storage_root: None,
        }
    }
}

impl SessionConfig {
    /// Path of the model inside the sandbox storage
    pub fn model_path(&self) -> String {
        format!("/models/{}", self.model_name)
    }
}

/// Sampling parameters for one completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Temperature (0.0 = greedy)
    pub temperature: f32,
    /// Top-k cutoff
    pub top_k: u32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Maximum tokens generated per completion
    pub max_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_k: 40,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

/// Analysis loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Phrase the model emits when a chunk has nothing to report
    pub sentinel: String,
    /// Prompt sent for each chunk; `{chunk}` is replaced by its content
    pub prompt_template: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sentinel: "NO_CLAUSES_FOUND".to_string(),
            prompt_template: "STRICTLY ANALYZE THIS TEXT ONLY:\n\n{chunk}".to_string(),
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Name the loaded model is registered under
    pub model: String,
    /// Transport timeout in seconds (0 disables it)
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "eulai".to_string(),
            timeout_secs: 0,
        }
    }
}

/// Extra exclusion rules merged into the default noise filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Additional tag names to drop
    pub exclude_tags: Vec<String>,
    /// Additional element ids to drop
    pub exclude_ids: Vec<String>,
    /// Additional class names to drop
    pub exclude_classes: Vec<String>,
    /// Additional ARIA roles to drop
    pub exclude_roles: Vec<String>,
}
