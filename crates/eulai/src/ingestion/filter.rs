//! Exclusion predicates deciding which nodes are page noise

use std::collections::HashSet;

use crate::config::ExtractionConfig;

use super::node::StructuredNode;

/// Decides whether a node (and its whole subtree) is dropped
pub trait ExclusionPredicate: Send + Sync {
    /// True when the node contributes no text
    fn excludes(&self, node: &StructuredNode) -> bool;
}

impl<F> ExclusionPredicate for F
where
    F: Fn(&StructuredNode) -> bool + Send + Sync,
{
    fn excludes(&self, node: &StructuredNode) -> bool {
        self(node)
    }
}

const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "nav", "footer", "header", "svg", "aside", "form",
    "button", "input", "select", "textarea", "template",
];
const NOISE_IDS: &[&str] = &["chat", "footer"];
const NOISE_CLASSES: &[&str] = &["cookie-banner", "chat-window", "footer"];
const NOISE_ROLES: &[&str] = &["banner", "navigation"];

/// Default filter for scripts, page chrome, chat widgets and form controls
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    tags: HashSet<String>,
    ids: HashSet<String>,
    classes: HashSet<String>,
    roles: HashSet<String>,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            tags: owned(NOISE_TAGS),
            ids: owned(NOISE_IDS),
            classes: owned(NOISE_CLASSES),
            roles: owned(NOISE_ROLES),
        }
    }
}

impl NoiseFilter {
    /// Create the default filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Default filter extended with configured rules
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let mut filter = Self::default();
        filter
            .tags
            .extend(config.exclude_tags.iter().map(|t| t.to_lowercase()));
        filter.ids.extend(config.exclude_ids.iter().cloned());
        filter.classes.extend(config.exclude_classes.iter().cloned());
        filter.roles.extend(config.exclude_roles.iter().cloned());
        filter
    }
}

impl ExclusionPredicate for NoiseFilter {
    fn excludes(&self, node: &StructuredNode) -> bool {
        if node.is_text() {
            return false;
        }

        if self.tags.contains(node.tag.as_str()) {
            return true;
        }
        // Labels that only wrap a checkbox or radio are form chrome
        if node.tag == "label" && node.wraps_input {
            return true;
        }
        if node.id.as_ref().is_some_and(|id| self.ids.contains(id)) {
            return true;
        }
        if node.role.as_ref().is_some_and(|role| self.roles.contains(role)) {
            return true;
        }
        node.classes.iter().any(|c| self.classes.contains(c))
    }
}
