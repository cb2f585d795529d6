//! Read-only structural document tree handed to the extractor

use serde::{Deserialize, Serialize};

/// Structural kind of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Heading with its level (1-6)
    Heading(u8),
    /// Paragraph
    Paragraph,
    /// Ordered or unordered list container
    List,
    /// List item
    ListItem,
    /// Bold / strong emphasis
    Bold,
    /// Italic / emphasis
    Italic,
    /// Hyperlink with its target
    Link { href: String },
    /// Table
    Table,
    /// Table row
    TableRow,
    /// Table header or data cell
    TableCell,
    /// Hard line break
    LineBreak,
    /// Any other block-level element
    Block,
    /// Any other inline-level element
    Inline,
    /// Text leaf
    Text,
}

impl NodeKind {
    /// Block-level kinds get newline separation in the fallback path
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Self::Heading(_) | Self::Paragraph | Self::List | Self::ListItem | Self::Table | Self::Block
        )
    }
}

/// A node of the document tree
///
/// Element metadata (`tag`, `id`, `classes`, `role`) is what exclusion
/// predicates match against; `hidden` carries computed invisibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredNode {
    /// Structural kind
    pub kind: NodeKind,
    /// Lowercase element name (empty for text leaves)
    #[serde(default)]
    pub tag: String,
    /// Element id
    #[serde(default)]
    pub id: Option<String>,
    /// Element classes
    #[serde(default)]
    pub classes: Vec<String>,
    /// ARIA role
    #[serde(default)]
    pub role: Option<String>,
    /// Computed invisibility (display:none, visibility:hidden, hidden attribute)
    #[serde(default)]
    pub hidden: bool,
    /// Element contains a form input (labels wrapping checkboxes etc.)
    #[serde(default)]
    pub wraps_input: bool,
    /// Leaf text content (text nodes only)
    #[serde(default)]
    pub text: String,
    /// Ordered children
    #[serde(default)]
    pub children: Vec<StructuredNode>,
}

impl StructuredNode {
    /// Create an element node
    pub fn element(kind: NodeKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            role: None,
            hidden: false,
            wraps_input: false,
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Create a text leaf
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: content.into(),
            ..Self::element(NodeKind::Text, "")
        }
    }

    /// Shorthand for a generic block element
    pub fn block(tag: impl Into<String>) -> Self {
        Self::element(NodeKind::Block, tag)
    }

    /// Attach children
    pub fn with_children(mut self, children: Vec<StructuredNode>) -> Self {
        self.children = children;
        self
    }

    /// Append one child
    pub fn push(mut self, child: StructuredNode) -> Self {
        self.children.push(child);
        self
    }

    /// Set the element id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a class
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set the ARIA role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Mark as computed-invisible
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// True for text leaves
    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }
}
