//! Boundary-aware text segmentation into bounded chunks

use crate::config::SegmentationConfig;
use crate::error::{Error, Result};
use crate::types::Chunk;

/// Boundary classes, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// Newline right before a markdown heading marker
    Heading,
    /// Blank line
    Paragraph,
    /// Sentence-terminal punctuation followed by whitespace
    Sentence,
    /// Any whitespace
    Whitespace,
}

impl Boundary {
    const PRIORITY: [Boundary; 4] = [
        Boundary::Heading,
        Boundary::Paragraph,
        Boundary::Sentence,
        Boundary::Whitespace,
    ];

    fn matches_at(&self, window: &[char], i: usize) -> bool {
        let next = window.get(i + 1).copied();
        match self {
            Self::Heading => {
                window[i] == '\n'
                    && next == Some('#')
                    && window.get(i + 2).is_some_and(|c| c.is_whitespace())
            }
            Self::Paragraph => window[i] == '\n' && next == Some('\n'),
            Self::Sentence => {
                matches!(window[i], '.' | '!' | '?') && next.is_some_and(|c| c.is_whitespace())
            }
            Self::Whitespace => window[i].is_whitespace(),
        }
    }

    /// Offset of the last match inside the window
    fn last_in(&self, window: &[char]) -> Option<usize> {
        (0..window.len()).rev().find(|&i| self.matches_at(window, i))
    }
}

/// Splits text into ordered chunks of at most `max_chars` characters
#[derive(Debug, Clone)]
pub struct Segmenter {
    max_chars: usize,
    min_cut: usize,
}

impl Segmenter {
    /// Boundaries at or before this offset are ignored by default
    pub const DEFAULT_MIN_CUT: usize = 100;

    /// Create a segmenter with the given maximum chunk size
    pub fn new(max_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(Error::Config("maximum chunk size must be > 0".into()));
        }
        Ok(Self {
            max_chars,
            min_cut: Self::DEFAULT_MIN_CUT,
        })
    }

    /// Create from configuration
    pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
        Ok(Self::new(config.max_chunk_chars)?.with_min_cut(config.min_cut))
    }

    /// Override the minimum-cut threshold
    pub fn with_min_cut(mut self, min_cut: usize) -> Self {
        self.min_cut = min_cut;
        self
    }

    /// Maximum chunk size in characters
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split text into trimmed, non-empty chunks in source order
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < chars.len() {
            let remaining = &chars[start..];
            if remaining.len() <= self.max_chars {
                push_trimmed(&mut chunks, remaining);
                break;
            }

            let window = &remaining[..self.max_chars];
            let end = match self.find_cut(window) {
                Some(offset) => offset + 1,
                None => self.max_chars,
            };
            push_trimmed(&mut chunks, &window[..end]);
            start += end;
        }

        tracing::debug!(
            "Segmented {} chars into {} chunks (max {})",
            chars.len(),
            chunks.len(),
            self.max_chars
        );
        chunks
    }

    /// Highest-priority boundary whose last match clears the threshold
    fn find_cut(&self, window: &[char]) -> Option<usize> {
        Boundary::PRIORITY.iter().find_map(|boundary| {
            boundary
                .last_in(window)
                .filter(|&offset| offset > self.min_cut)
        })
    }
}

fn push_trimmed(chunks: &mut Vec<Chunk>, slice: &[char]) {
    let content: String = slice.iter().collect();
    let content = content.trim();
    if !content.is_empty() {
        chunks.push(Chunk::new(chunks.len(), content.to_string()));
    }
}
