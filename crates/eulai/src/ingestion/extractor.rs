//! Tree-to-text extraction with markdown-like structure markers

use regex::Regex;
use std::sync::OnceLock;

use crate::types::Extraction;

use super::filter::{ExclusionPredicate, NoiseFilter};
use super::node::{NodeKind, StructuredNode};

/// Deepest nesting extracted; subtrees below it are dropped
pub const MAX_TREE_DEPTH: usize = 512;

fn blank_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

/// Converts a document tree into normalized text
pub struct Extractor {
    filter: Box<dyn ExclusionPredicate>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(NoiseFilter::default())
    }
}

impl Extractor {
    /// Create an extractor with the given exclusion predicate
    pub fn new(filter: impl ExclusionPredicate + 'static) -> Self {
        Self {
            filter: Box::new(filter),
        }
    }

    /// Extract normalized text
    pub fn extract(&self, root: &StructuredNode) -> Extraction {
        Extraction::new(normalize(&self.render(root, 0, 0)))
    }

    /// Render one node. `depth` counts enclosing list items, `level` tree depth.
    fn render(&self, node: &StructuredNode, depth: usize, level: usize) -> String {
        if level > MAX_TREE_DEPTH {
            tracing::warn!(
                "Dropping <{}> nested deeper than {} levels",
                node.tag,
                MAX_TREE_DEPTH
            );
            return String::new();
        }

        if node.is_text() {
            let text = collapse_whitespace(&node.text);
            // Isolated single characters are layout noise
            return if text.chars().count() > 1 { text } else { String::new() };
        }

        if node.hidden || self.filter.excludes(node) {
            return String::new();
        }

        let child_depth = if node.kind == NodeKind::ListItem { depth + 1 } else { depth };
        let mut content = String::new();
        for child in &node.children {
            content.push_str(&self.render(child, child_depth, level + 1));
        }

        let trimmed = content.trim();
        if trimmed.is_empty() && node.kind != NodeKind::LineBreak {
            return String::new();
        }

        let out = match &node.kind {
            NodeKind::Heading(1) => format!("\n# {}\n\n", trimmed),
            NodeKind::Heading(2) => format!("\n## {}\n\n", trimmed),
            NodeKind::Heading(3) => format!("\n### {}\n\n", trimmed),
            NodeKind::Paragraph => format!("\n{}\n\n", trimmed),
            NodeKind::ListItem => format!("\n{}* {}", "  ".repeat(depth), trimmed),
            NodeKind::List => format!("\n{}\n", content),
            NodeKind::Bold => format!(" **{}** ", trimmed),
            NodeKind::Italic => format!(" *{}* ", trimmed),
            NodeKind::Link { href } => format!(" [{}]({}) ", trimmed, href),
            NodeKind::Table => format!("\n\n{}\n\n", self.render_table(node, depth, level)),
            NodeKind::LineBreak => "\n".to_string(),
            kind if kind.is_block() => format!("\n{}\n", trimmed),
            _ => content,
        };

        out
    }

    /// Rows joined with ` | `, separator row after the first row
    fn render_table(&self, table: &StructuredNode, depth: usize, level: usize) -> String {
        let mut rows = Vec::new();
        collect(table, &NodeKind::TableRow, &mut rows);

        let mut out = String::new();
        for (i, row) in rows.iter().enumerate() {
            if row.hidden || self.filter.excludes(row) {
                continue;
            }

            let mut cells = Vec::new();
            collect(row, &NodeKind::TableCell, &mut cells);

            let mut texts = Vec::with_capacity(cells.len());
            for cell in cells {
                let text = self.render(cell, depth, level + 1);
                texts.push(text.trim().replace('\n', " "));
            }

            if texts.is_empty() {
                continue;
            }
            out.push_str(&format!("| {} |\n", texts.join(" | ")));
            if i == 0 {
                let separators = vec!["---"; texts.len()];
                out.push_str(&format!("| {} |\n", separators.join(" | ")));
            }
        }

        out
    }
}

/// Collect descendants of `kind` without descending into matches
fn collect<'a>(node: &'a StructuredNode, kind: &NodeKind, out: &mut Vec<&'a StructuredNode>) {
    for child in &node.children {
        if &child.kind == kind {
            out.push(child);
        } else {
            collect(child, kind, out);
        }
    }
}

/// Replace every whitespace run with a single space
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

/// Collapse 3+ newlines to a blank line and trim the ends
pub fn normalize(raw: &str) -> String {
    blank_run_regex().replace_all(raw, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn el(kind: NodeKind, tag: &str, children: Vec<StructuredNode>) -> StructuredNode {
        StructuredNode::element(kind, tag).with_children(children)
    }

    fn t(text: &str) -> StructuredNode {
        StructuredNode::text(text)
    }

    fn extract(tree: &StructuredNode) -> String {
        let result = Extractor::default().extract(tree);
        assert!(result.valid);
        result.text
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let tree = StructuredNode::block("body").with_children(vec![
            el(NodeKind::Heading(1), "h1", vec![t("Terms of Service")]),
            el(NodeKind::Paragraph, "p", vec![t("We   collect\n data.")]),
            el(NodeKind::Heading(2), "h2", vec![t("Refunds")]),
        ]);

        assert_eq!(
            extract(&tree),
            "# Terms of Service\n\nWe collect data.\n\n## Refunds"
        );
    }

    #[test]
    fn test_inline_markers() {
        let tree = el(
            NodeKind::Paragraph,
            "p",
            vec![
                t("You"),
                el(NodeKind::Bold, "b", vec![t("must")]),
                t("read the"),
                el(
                    NodeKind::Link {
                        href: "https://example.com/policy".into(),
                    },
                    "a",
                    vec![t("policy")],
                ),
                el(NodeKind::Italic, "em", vec![t("today")]),
            ],
        );

        assert_eq!(
            extract(&tree),
            "You **must** read the [policy](https://example.com/policy)  *today*"
        );
    }

    #[test]
    fn test_nested_list_indentation() {
        let tree = el(
            NodeKind::List,
            "ul",
            vec![el(
                NodeKind::ListItem,
                "li",
                vec![
                    t("outer"),
                    el(
                        NodeKind::List,
                        "ul",
                        vec![el(NodeKind::ListItem, "li", vec![t("inner")])],
                    ),
                ],
            )],
        );

        assert_eq!(extract(&tree), "* outer\n\n  * inner");
    }

    #[test]
    fn test_table_rows() {
        let row = |cells: &[&str]| {
            el(
                NodeKind::TableRow,
                "tr",
                cells
                    .iter()
                    .map(|c| el(NodeKind::TableCell, "td", vec![t(c)]))
                    .collect(),
            )
        };
        let tree = el(
            NodeKind::Table,
            "table",
            vec![row(&["Plan", "Price"]), row(&["Basic", "10 EUR"]), row(&["Pro", "20 EUR"])],
        );

        assert_eq!(
            extract(&tree),
            "| Plan | Price |\n| --- | --- |\n| Basic | 10 EUR |\n| Pro | 20 EUR |"
        );
    }

    #[test]
    fn test_noise_and_hidden_nodes_dropped() {
        let tree = StructuredNode::block("body").with_children(vec![
            StructuredNode::block("nav").push(t("Home About")),
            el(NodeKind::Paragraph, "p", vec![t("Visible clause")]).hidden(),
            el(NodeKind::Paragraph, "p", vec![t("Kept clause")]),
            StructuredNode::element(NodeKind::Inline, "script").push(t("var x = 1;")),
        ]);

        assert_eq!(extract(&tree), "Kept clause");
    }

    #[test]
    fn test_single_char_text_is_noise() {
        let tree = el(NodeKind::Paragraph, "p", vec![t("|"), t("ok"), t(" ")]);
        assert_eq!(extract(&tree), "ok");
    }

    #[test]
    fn test_line_break_kept_inside_content() {
        let tree = el(
            NodeKind::Paragraph,
            "p",
            vec![t("line one"), el(NodeKind::LineBreak, "br", vec![]), t("line two")],
        );
        assert_eq!(extract(&tree), "line one\nline two");
    }

    #[test]
    fn test_minor_headings_are_plain_blocks() {
        let tree = StructuredNode::block("body").with_children(vec![
            el(NodeKind::Heading(4), "h4", vec![t("Liability")]),
            el(NodeKind::Heading(6), "h6", vec![t("Notes")]),
        ]);
        assert_eq!(extract(&tree), "Liability\n\nNotes");

        let heading = el(NodeKind::Heading(5), "h5", vec![t("Fees")]);
        assert_eq!(Extractor::default().render(&heading, 0, 0), "\nFees\n");
    }

    #[test]
    fn test_too_deep_subtree_is_dropped() {
        let mut deep = t("deep text");
        for _ in 0..600 {
            deep = StructuredNode::element(NodeKind::Block, "div").push(deep);
        }
        let tree = StructuredNode::block("body").with_children(vec![
            el(NodeKind::Paragraph, "p", vec![t("Intro clause.")]),
            deep,
        ]);

        assert_eq!(extract(&tree), "Intro clause.");
    }

    #[test]
    fn test_deep_html_keeps_shallow_text() {
        let markup = format!(
            "<body><p>Intro clause.</p>{}buried{}</body>",
            "<div>".repeat(600),
            "</div>".repeat(600)
        );
        let doc = crate::ingestion::HtmlDocument::parse(&markup);
        assert_eq!(extract(&doc.to_tree()), "Intro clause.");
    }

    #[test]
    fn test_from_html() {
        let doc = crate::ingestion::HtmlDocument::parse(
            "<body><header>Logo</header><h2>Privacy</h2>\
             <p>We sell <strong>your data</strong> to partners.</p>\
             <footer>Copyright</footer></body>",
        );
        assert_eq!(
            extract(&doc.to_tree()),
            "## Privacy\n\nWe sell  **your data**  to partners."
        );
    }

    fn arb_tree() -> impl Strategy<Value = StructuredNode> {
        let leaf = "[ a-z\\n\\t]{0,12}".prop_map(StructuredNode::text);
        leaf.prop_recursive(5, 64, 6, |inner| {
            let kind = prop_oneof![
                Just(NodeKind::Heading(1)),
                Just(NodeKind::Heading(3)),
                Just(NodeKind::Paragraph),
                Just(NodeKind::List),
                Just(NodeKind::ListItem),
                Just(NodeKind::Bold),
                Just(NodeKind::Italic),
                Just(NodeKind::Table),
                Just(NodeKind::TableRow),
                Just(NodeKind::TableCell),
                Just(NodeKind::LineBreak),
                Just(NodeKind::Block),
                Just(NodeKind::Inline),
            ];
            (kind, prop::collection::vec(inner, 0..6))
                .prop_map(|(kind, children)| StructuredNode::element(kind, "x").with_children(children))
        })
    }

    proptest! {
        #[test]
        fn prop_output_is_normalized(tree in arb_tree()) {
            let result = Extractor::default().extract(&tree);
            prop_assert!(result.valid);
            prop_assert!(!result.text.contains("\n\n\n"));
            prop_assert_eq!(result.text.trim(), result.text.as_str());
        }
    }
}
