//! Prompt construction for one chunk

use crate::config::{AnalysisConfig, CHUNK_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::types::Chunk;

/// Builds the per-chunk analysis prompt from a template
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            template: AnalysisConfig::default().prompt_template,
        }
    }
}

impl PromptBuilder {
    /// Create a builder; the template must contain `{chunk}`
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(CHUNK_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "prompt template must contain {}",
                CHUNK_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    /// Create from configuration
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        Self::new(config.prompt_template.clone())
    }

    /// Prompt carrying this chunk's content and nothing else
    pub fn build(&self, chunk: &Chunk) -> String {
        self.template.replace(CHUNK_PLACEHOLDER, &chunk.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt() {
        let chunk = Chunk::new(0, "You waive all rights.".into());
        assert_eq!(
            PromptBuilder::default().build(&chunk),
            "STRICTLY ANALYZE THIS TEXT ONLY:\n\nYou waive all rights."
        );
    }

    #[test]
    fn test_template_requires_placeholder() {
        assert!(PromptBuilder::new("Analyze:").is_err());

        let builder = PromptBuilder::new("<doc>{chunk}</doc>").unwrap();
        let chunk = Chunk::new(3, "text".into());
        assert_eq!(builder.build(&chunk), "<doc>text</doc>");
    }
}
