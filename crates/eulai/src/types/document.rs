//! Extraction output and chunk types

use serde::{Deserialize, Serialize};

/// Result of extracting a document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// False when the page could not be read and `text` is empty
    pub valid: bool,
    /// Normalized markdown-like text
    pub text: String,
}

impl Extraction {
    /// Successful extraction
    pub fn new(text: String) -> Self {
        Self { valid: true, text }
    }

    /// Degraded result for a page that could not be read
    pub fn invalid() -> Self {
        Self {
            valid: false,
            text: String::new(),
        }
    }

    /// True when there is nothing to analyze
    pub fn is_empty(&self) -> bool {
        !self.valid || self.text.is_empty()
    }
}

/// A bounded slice of extracted text submitted to the engine as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the chunk sequence (0-indexed)
    pub index: usize,
    /// Trimmed, non-empty content
    pub content: String,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(index: usize, content: String) -> Self {
        Self { index, content }
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Human-facing block label ("Block 1", "Block 2", ...)
    pub fn label(&self) -> String {
        format!("Block {}", self.index + 1)
    }
}
