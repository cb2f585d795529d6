//! HTML host: builds a `StructuredNode` tree from markup

use scraper::{ElementRef, Html, Node, Selector};

use super::extractor::MAX_TREE_DEPTH;
use super::node::{NodeKind, StructuredNode};

const BLOCK_TAGS: &[&str] = &[
    "html", "body", "div", "section", "article", "main", "blockquote", "pre", "figure",
    "figcaption", "dl", "dt", "dd", "address", "details", "summary", "fieldset", "hgroup", "center",
];

/// Parsed HTML document
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    /// Parse a full HTML document
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    /// Build the structural tree rooted at `<body>` (or the document root)
    pub fn to_tree(&self) -> StructuredNode {
        let root = Selector::parse("body")
            .ok()
            .and_then(|selector| self.html.select(&selector).next())
            .unwrap_or_else(|| self.html.root_element());

        convert_element(root, 0)
    }

    /// Document title, when present
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

fn convert_element(element: ElementRef<'_>, level: usize) -> StructuredNode {
    let value = element.value();
    let tag = value.name().to_lowercase();
    let style = value.attr("style").map(normalize_style).unwrap_or_default();

    let mut node = StructuredNode::element(classify(&tag, value.attr("href"), &style), tag.clone());
    node.id = value.id().map(str::to_string);
    node.classes = value.classes().map(str::to_string).collect();
    node.role = value.attr("role").map(str::to_string);
    node.hidden = value.attr("hidden").is_some()
        || value.attr("aria-hidden") == Some("true")
        || style.contains("display:none")
        || style.contains("visibility:hidden");
    node.wraps_input = tag == "label"
        && element.descendants().any(|d| {
            d.value()
                .as_element()
                .is_some_and(|e| e.name().eq_ignore_ascii_case("input"))
        });

    if level >= MAX_TREE_DEPTH {
        tracing::warn!("HTML nesting deeper than {} levels, truncating", MAX_TREE_DEPTH);
        return node;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => node.children.push(StructuredNode::text(&**text)),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    node.children.push(convert_element(child_element, level + 1));
                }
            }
            _ => {}
        }
    }

    node
}

fn classify(tag: &str, href: Option<&str>, style: &str) -> NodeKind {
    match tag {
        "h1" => NodeKind::Heading(1),
        "h2" => NodeKind::Heading(2),
        "h3" => NodeKind::Heading(3),
        "h4" => NodeKind::Heading(4),
        "h5" => NodeKind::Heading(5),
        "h6" => NodeKind::Heading(6),
        "p" => NodeKind::Paragraph,
        "ul" | "ol" => NodeKind::List,
        "li" => NodeKind::ListItem,
        "strong" | "b" => NodeKind::Bold,
        "em" | "i" => NodeKind::Italic,
        "a" => NodeKind::Link {
            href: href.unwrap_or_default().to_string(),
        },
        "table" => NodeKind::Table,
        "tr" => NodeKind::TableRow,
        "td" | "th" => NodeKind::TableCell,
        "br" => NodeKind::LineBreak,
        _ if BLOCK_TAGS.contains(&tag) => NodeKind::Block,
        _ if declares_block_display(style) => NodeKind::Block,
        _ => NodeKind::Inline,
    }
}

/// Lowercase and strip whitespace so declarations compare as `prop:value`
fn normalize_style(style: &str) -> String {
    style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn declares_block_display(style: &str) -> bool {
    style.split(';').any(|decl| {
        decl.strip_prefix("display:")
            .is_some_and(|v| v.contains("block") || v.contains("flex") || v.contains("grid"))
    })
}
