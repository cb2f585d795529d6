//! HTML rendering of parsed blocks

use pulldown_cmark::{html, Options, Parser};
use serde::{Deserialize, Serialize};

use crate::types::Finding;

use super::classifier::{ParsedBlock, Segment};

/// Notice shown ahead of output that ignored the tagged format
pub const FORMAT_WARNING: &str = "Non-standard format detected - Free interpretation";
/// Title shown while a finding line has no title yet
pub const PENDING_TITLE: &str = "Analysis in progress...";
/// Text of a block whose output was only the sentinel
pub const EMPTY_BLOCK: &str = "No significant clauses found.";

/// Converts narrative markdown to HTML
pub trait MarkdownRenderer: Send + Sync {
    fn to_html(&self, markdown: &str) -> String;
}

/// CommonMark renderer backed by pulldown-cmark
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMark;

impl MarkdownRenderer for CommonMark {
    fn to_html(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, Parser::new_ext(markdown, options));
        out
    }
}

/// A block as last rendered for its chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedBlock {
    pub chunk_index: usize,
    pub html: String,
    pub parsed: ParsedBlock,
}

/// Renders parsed output into the block's HTML
pub struct BlockRenderer {
    markdown: Box<dyn MarkdownRenderer>,
}

impl Default for BlockRenderer {
    fn default() -> Self {
        Self::new(CommonMark)
    }
}

impl BlockRenderer {
    pub fn new(markdown: impl MarkdownRenderer + 'static) -> Self {
        Self {
            markdown: Box::new(markdown),
        }
    }

    /// Render a parsed buffer
    pub fn render(&self, parsed: ParsedBlock) -> RenderedBlock {
        let mut html = String::new();

        if parsed.format_warning {
            html.push_str(&format!(
                "<div class=\"format-warning\"><i class=\"fa-solid fa-triangle-exclamation\"></i><span>{}</span></div>\n",
                FORMAT_WARNING
            ));
        }

        for segment in &parsed.segments {
            match segment {
                Segment::Narrative { text } => html.push_str(&self.markdown.to_html(text)),
                Segment::Finding(finding) => html.push_str(&status_box(finding)),
            }
        }

        RenderedBlock {
            chunk_index: parsed.chunk_index,
            html,
            parsed,
        }
    }

    /// Placeholder for a block that produced nothing but the sentinel
    pub fn render_empty(&self, chunk_index: usize) -> RenderedBlock {
        RenderedBlock {
            chunk_index,
            html: format!("<p class=\"empty-block\">{}</p>\n", EMPTY_BLOCK),
            parsed: ParsedBlock {
                chunk_index,
                ..Default::default()
            },
        }
    }

    /// Visible failure for one block
    pub fn render_error(&self, chunk_index: usize, message: &str) -> RenderedBlock {
        RenderedBlock {
            chunk_index,
            html: format!(
                "<div class=\"block-error\">Error during analysis: {}</div>\n",
                escape_html(message)
            ),
            parsed: ParsedBlock {
                chunk_index,
                ..Default::default()
            },
        }
    }
}

fn status_box(finding: &Finding) -> String {
    let title = if finding.title.is_empty() {
        PENDING_TITLE.to_string()
    } else {
        escape_html(&finding.title)
    };
    let explanation = if finding.explanation.is_empty() {
        String::new()
    } else {
        format!(
            "<p class=\"status-explanation\">{}</p>",
            escape_html(&finding.explanation)
        )
    };

    format!(
        "<div class=\"status-box {tag}\">\
         <div class=\"status-icon-wrapper\"><i class=\"{icon} status-fa-icon\"></i></div>\
         <div class=\"status-content\"><span class=\"status-title\">{title}</span>{explanation}</div>\
         </div>\n",
        tag = finding.severity.as_str(),
        icon = finding.severity.icon(),
        title = title,
        explanation = explanation,
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Classifier;

    fn render(buffer: &str) -> String {
        BlockRenderer::default()
            .render(Classifier::new().parse(0, buffer))
            .html
    }

    #[test]
    fn test_status_box() {
        let html = render("[BLOCKER]: **Arbitration**: You waive <all> rights.");

        assert!(html.contains("status-box BLOCKER"));
        assert!(html.contains("fa-solid fa-ban"));
        assert!(html.contains("<span class=\"status-title\">Arbitration</span>"));
        assert!(html.contains("You waive &lt;all&gt; rights."));
        assert!(!html.contains("format-warning"));
    }

    #[test]
    fn test_pending_title() {
        let html = render("[GOOD]");
        assert!(html.contains(PENDING_TITLE));
        assert!(!html.contains("status-explanation"));
    }

    #[test]
    fn test_narrative_through_markdown() {
        let html = render("Some **bold** prose");

        assert!(html.starts_with("<div class=\"format-warning\">"));
        assert!(html.contains("<p>Some <strong>bold</strong> prose</p>"));
    }

    #[test]
    fn test_custom_markdown_renderer() {
        struct Plain;
        impl MarkdownRenderer for Plain {
            fn to_html(&self, markdown: &str) -> String {
                format!("[{}]", markdown)
            }
        }

        let parsed = Classifier::new().parse(1, "intro\n[NEUTRAL]: Jurisdiction: France");
        let block = BlockRenderer::new(Plain).render(parsed);

        assert_eq!(block.chunk_index, 1);
        assert!(block.html.starts_with("[intro]"));
        assert!(block.html.contains("status-box NEUTRAL"));
    }

    #[test]
    fn test_empty_and_error_blocks() {
        let renderer = BlockRenderer::default();
        assert!(renderer.render_empty(0).html.contains(EMPTY_BLOCK));
        assert!(renderer
            .render_error(0, "<channel closed>")
            .html
            .contains("&lt;channel closed&gt;"));
    }
}
