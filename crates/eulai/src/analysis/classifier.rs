//! Parses streamed model output into narrative spans and tagged findings

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::types::{Finding, Severity};

fn reasoning_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"))
}

/// `[TAG]`, optional `: **title**`, optional `: explanation`, one line each
fn finding_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^-?\s?\[(BLOCKER|BAD|GOOD|NEUTRAL)\](?:\s*:\s*(\*\*)?([^:\n]*?)(\*\*)?)?(?:\s*:\s*(.*))?$",
        )
        .expect("valid regex")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(BLOCKER|BAD|GOOD|NEUTRAL)\]").expect("valid regex"))
}

/// A piece of parsed output, in buffer order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Free text between findings (never blank)
    Narrative { text: String },
    /// Tagged finding line
    Finding(Finding),
}

/// Result of parsing one chunk's output buffer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedBlock {
    /// Chunk the output belongs to
    pub chunk_index: usize,
    /// Narrative spans and findings in order
    pub segments: Vec<Segment>,
    /// Output was non-empty but carried no severity tag at all
    pub format_warning: bool,
}

impl ParsedBlock {
    /// Findings only
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Finding(finding) => Some(finding),
            Segment::Narrative { .. } => None,
        })
    }

    /// True when nothing was parsed
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Stateless output classifier; re-parsing a grown buffer is always safe
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    /// Create a classifier
    pub fn new() -> Self {
        Self
    }

    /// Parse the full buffer accumulated so far for a chunk
    pub fn parse(&self, chunk_index: usize, buffer: &str) -> ParsedBlock {
        let clean = strip_reasoning(buffer);
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in finding_regex().captures_iter(&clean) {
            let Some(whole) = caps.get(0) else { continue };
            push_narrative(&mut segments, &clean[last..whole.start()]);

            // The regex only admits the four known tags
            let Ok(severity) = caps[1].parse::<Severity>() else {
                continue;
            };
            let field = |i: usize| {
                caps.get(i)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default()
            };

            segments.push(Segment::Finding(Finding {
                severity,
                title: field(3),
                explanation: field(5),
                chunk_index,
            }));
            last = whole.end();
        }
        push_narrative(&mut segments, &clean[last..]);

        ParsedBlock {
            chunk_index,
            segments,
            format_warning: !clean.is_empty() && !tag_regex().is_match(&clean),
        }
    }
}

/// Remove `<think>...</think>` sections and trim
pub fn strip_reasoning(buffer: &str) -> String {
    reasoning_regex().replace_all(buffer, "").trim().to_string()
}

fn push_narrative(segments: &mut Vec<Segment>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        segments.push(Segment::Narrative {
            text: text.to_string(),
        });
    }
}
