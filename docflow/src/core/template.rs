//! Caller-owned markup templates with `{{NAME}}` placeholders.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::color::{color_set, Color};
use crate::utils::static_regex;

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    // Names must start with an uppercase letter, so literal content such as
    // `{{1.5}}` or `{{ price }}` never reads as a placeholder.
    static_regex(&PLACEHOLDER, r"\{\{\s*([A-Z][A-Z0-9_]*)\s*\}\}")
}

/// Returns the distinct placeholder names in `text`, in first-seen order.
#[must_use]
pub fn find_placeholders(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    placeholder_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Returns every literal placeholder occurrence (e.g. `{{ CLIENT_NAME }}`)
/// left in `text`, in document order.
#[must_use]
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    placeholder_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// An immutable markup template.
///
/// Placeholders and colors are extracted once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Template {
    markup: String,
    placeholders: Vec<String>,
    colors: BTreeSet<Color>,
}

impl Template {
    /// Creates a template from markup.
    #[must_use]
    pub fn new(markup: impl Into<String>) -> Self {
        let markup = markup.into();
        let placeholders = find_placeholders(&markup);
        let colors = color_set(&markup);
        Self {
            markup,
            placeholders,
            colors,
        }
    }

    /// The raw template markup.
    #[must_use]
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Placeholder names in first-seen order.
    #[must_use]
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Colors present in the template's CSS contexts.
    #[must_use]
    pub fn colors(&self) -> &BTreeSet<Color> {
        &self.colors
    }

    /// Returns true if the template declares the placeholder.
    #[must_use]
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders.iter().any(|p| p == name)
    }
}

impl From<String> for Template {
    fn from(markup: String) -> Self {
        Self::new(markup)
    }
}

impl From<&str> for Template {
    fn from(markup: &str) -> Self {
        Self::new(markup)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.markup
    }
}
