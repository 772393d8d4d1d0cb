//! Markup inspection helpers shared by the validator and optimizer.

use regex::Regex;
use scraper::{Html, Node};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::static_regex;

static TAG: OnceLock<Regex> = OnceLock::new();
static NUMBER: OnceLock<Regex> = OnceLock::new();

/// Most balance problems reported for one document.
pub const MAX_BALANCE_ERRORS: usize = 10;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

// Elements whose end tag HTML lets the parser infer.
const IMPLIED_END: &[&str] = &[
    "p", "li", "td", "th", "tr", "thead", "tbody", "tfoot", "option", "dt", "dd", "colgroup",
    "html", "head", "body",
];

/// Visible text of `markup` with whitespace collapsed. Text inside
/// `<style>`, `<script>` and `<title>` is excluded; entities are decoded.
#[must_use]
pub fn visible_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut out = String::new();
    for node in document.root_element().descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|el| el.name().to_string()))
                .is_some_and(|name| matches!(name.as_str(), "style" | "script" | "title"));
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }
    normalize_whitespace(&out)
}

/// Collapses runs of whitespace to single spaces and trims.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive, whitespace-insensitive containment.
#[must_use]
pub fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let needle = normalize_whitespace(needle).to_lowercase();
    if needle.is_empty() {
        return true;
    }
    normalize_whitespace(haystack).to_lowercase().contains(&needle)
}

/// Numeric tokens (quantities, prices, dates) in `text`.
#[must_use]
pub fn numeric_tokens(text: &str) -> BTreeSet<String> {
    static_regex(&NUMBER, r"\d+(?:[.,]\d+)*")
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Reports tag-balance problems in document order: stray closing tags,
/// elements left open, and a tag cut off at the end of input.
#[must_use]
pub fn balance_errors(markup: &str) -> Vec<String> {
    let tag = static_regex(
        &TAG,
        r"(?is)<(?:style|script)\b[^>]*>.*?</\s*(?:style|script)\s*>|<!--.*?-->|<![^>]*>|<\?.*?\?>|</\s*([A-Za-z][\w:-]*)\s*>|<([A-Za-z][\w:-]*)(?:\s[^>]*)?>",
    );

    let mut errors = Vec::new();
    let mut stack: Vec<(String, usize)> = Vec::new();

    for caps in tag.captures_iter(markup) {
        let Some(whole) = caps.get(0) else { continue };

        if let Some(open) = caps.get(2) {
            let name = open.as_str().to_ascii_lowercase();
            let self_closing = whole.as_str().ends_with("/>");
            if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
                stack.push((name, whole.start()));
            }
            continue;
        }

        let Some(close) = caps.get(1) else { continue };
        let name = close.as_str().to_ascii_lowercase();
        if VOID_ELEMENTS.contains(&name.as_str()) {
            continue;
        }
        match stack.iter().rposition(|(open, _)| *open == name) {
            Some(index) => {
                for (inner, offset) in stack.drain(index..).skip(1) {
                    if !IMPLIED_END.contains(&inner.as_str()) {
                        errors.push(format!(
                            "element <{inner}> opened at byte {offset} is not closed before </{name}>"
                        ));
                    }
                }
            }
            None => errors.push(format!(
                "stray closing tag </{name}> at byte {}",
                whole.start()
            )),
        }
    }

    for (name, offset) in stack {
        if !IMPLIED_END.contains(&name.as_str()) {
            errors.push(format!("element <{name}> opened at byte {offset} is never closed"));
        }
    }

    if let Some(pos) = markup.rfind('<') {
        let tail = &markup[pos..];
        let starts_tag = tail[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/');
        if starts_tag && !tail.contains('>') {
            errors.push(format!("tag at byte {pos} is cut off at the end of the document"));
        }
    }

    if errors.len() > MAX_BALANCE_ERRORS {
        let extra = errors.len() - MAX_BALANCE_ERRORS;
        errors.truncate(MAX_BALANCE_ERRORS);
        errors.push(format!("... and {extra} more markup problems"));
    }
    errors
}
