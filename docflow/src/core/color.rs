//! Color literal extraction and normalization.
//!
//! Only CSS contexts are scanned: `<style>` declaration blocks, `style`
//! attributes and legacy `color`/`bgcolor` attributes. Anchor fragments such
//! as `href="#top"` and entities such as `&#123;` are never read as colors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use crate::utils::static_regex;

static STYLE_BLOCK: OnceLock<Regex> = OnceLock::new();
static DECLARATION_BLOCK: OnceLock<Regex> = OnceLock::new();
static STYLE_ATTR: OnceLock<Regex> = OnceLock::new();
static COLOR_ATTR: OnceLock<Regex> = OnceLock::new();
static HEX_COLOR: OnceLock<Regex> = OnceLock::new();
static RGB_COLOR: OnceLock<Regex> = OnceLock::new();

/// A normalized color literal.
///
/// Opaque colors are lowercase `#rrggbb`; translucent colors are
/// `rgba(r,g,b,a)` with a trimmed alpha.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Parses a single color literal (`#rgb`, `#rrggbb`, `rgb(...)`, ...).
    #[must_use]
    pub fn parse(literal: &str) -> Option<Self> {
        let literal = literal.trim();
        if let Some(hex) = literal.strip_prefix('#') {
            return Self::from_hex(hex);
        }
        let lower = literal.to_ascii_lowercase();
        let inner = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))?
            .strip_suffix(')')?;
        Self::from_rgb_args(inner)
    }

    /// Returns the normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_hex(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let hex = hex.to_ascii_lowercase();
        let expanded: String = match hex.len() {
            3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => hex,
            _ => return None,
        };
        if expanded.len() == 8 && expanded.ends_with("ff") {
            return Some(Self(format!("#{}", &expanded[..6])));
        }
        Some(Self(format!("#{expanded}")))
    }

    fn from_rgb_args(args: &str) -> Option<Self> {
        let parts: Vec<&str> = args
            .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 3 && parts.len() != 4 {
            return None;
        }

        let mut channels = [0u8; 3];
        for (slot, part) in channels.iter_mut().zip(&parts) {
            *slot = part.parse::<u8>().ok()?;
        }

        let alpha = match parts.get(3) {
            Some(raw) => parse_alpha(raw)?,
            None => 1.0,
        };

        let [r, g, b] = channels;
        if alpha >= 1.0 {
            Some(Self(format!("#{r:02x}{g:02x}{b:02x}")))
        } else {
            Some(Self(format!("rgba({r},{g},{b},{})", trim_float(alpha))))
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_alpha(raw: &str) -> Option<f64> {
    let value = if let Some(pct) = raw.strip_suffix('%') {
        pct.parse::<f64>().ok()? / 100.0
    } else {
        raw.parse::<f64>().ok()?
    };
    (0.0..=1.0).contains(&value).then_some(value)
}

fn trim_float(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// A color found in markup, with the byte offset of its CSS context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorOccurrence {
    /// The normalized color.
    pub color: Color,
    /// The raw literal as written.
    pub literal: String,
    /// Byte offset of the literal in the markup.
    pub offset: usize,
}

/// Extracts every color literal from the CSS contexts of `markup`, in
/// document order.
#[must_use]
pub fn extract_colors(markup: &str) -> Vec<ColorOccurrence> {
    let mut found = Vec::new();

    let style_block = static_regex(&STYLE_BLOCK, r"(?is)<style\b[^>]*>(.*?)</style\s*>");
    let declarations = static_regex(&DECLARATION_BLOCK, r"\{([^{}]*)\}");
    for block in style_block.captures_iter(markup) {
        if let Some(body) = block.get(1) {
            for decl in declarations.captures_iter(body.as_str()) {
                if let Some(inner) = decl.get(1) {
                    scan_segment(inner.as_str(), body.start() + inner.start(), &mut found);
                }
            }
        }
    }

    let style_attr = static_regex(
        &STYLE_ATTR,
        r#"(?i)\bstyle\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    );
    let color_attr = static_regex(
        &COLOR_ATTR,
        r#"(?i)\b(?:bg)?color\s*=\s*(?:"([^"]*)"|'([^']*)'|([#\w]+))"#,
    );
    for re in [style_attr, color_attr] {
        for caps in re.captures_iter(markup) {
            if let Some(value) = caps.iter().skip(1).flatten().next() {
                scan_segment(value.as_str(), value.start(), &mut found);
            }
        }
    }

    found.sort_by_key(|occ| occ.offset);
    found.dedup_by(|a, b| a.offset == b.offset);
    found
}

/// Returns the set of distinct normalized colors in `markup`.
#[must_use]
pub fn color_set(markup: &str) -> BTreeSet<Color> {
    extract_colors(markup).into_iter().map(|occ| occ.color).collect()
}

fn scan_segment(segment: &str, base: usize, out: &mut Vec<ColorOccurrence>) {
    let hex = static_regex(
        &HEX_COLOR,
        r"(?i)#(?:[0-9a-f]{8}|[0-9a-f]{6}|[0-9a-f]{3,4})\b",
    );
    let rgb = static_regex(&RGB_COLOR, r"(?i)rgba?\([^)]*\)");

    for m in hex.find_iter(segment).chain(rgb.find_iter(segment)) {
        if let Some(color) = Color::parse(m.as_str()) {
            out.push(ColorOccurrence {
                color,
                literal: m.as_str().to_string(),
                offset: base + m.start(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Color::parse("#FFF").unwrap().as_str(), "#ffffff");
        assert_eq!(Color::parse("#1a2B3c").unwrap().as_str(), "#1a2b3c");
        assert_eq!(Color::parse("#1a2b3cff").unwrap().as_str(), "#1a2b3c");
        assert_eq!(Color::parse("#1a2b3c80").unwrap().as_str(), "#1a2b3c80");
        assert!(Color::parse("#12").is_none());
        assert!(Color::parse("#ggg").is_none());
    }

    #[test]
    fn test_parse_rgb_forms() {
        assert_eq!(Color::parse("rgb(255, 0, 16)").unwrap().as_str(), "#ff0010");
        assert_eq!(Color::parse("rgba(255,0,16,1)").unwrap().as_str(), "#ff0010");
        assert_eq!(
            Color::parse("rgba(0, 0, 0, 0.5)").unwrap().as_str(),
            "rgba(0,0,0,0.5)"
        );
        assert_eq!(Color::parse("rgb(0 0 0 / 25%)").unwrap().as_str(), "rgba(0,0,0,0.25)");
        assert!(Color::parse("rgb(300, 0, 0)").is_none());
    }

    #[test]
    fn test_extract_from_css_contexts_only() {
        let markup = r##"<html><head><style>
            #header { background: #1E3A8A; color: rgb(255,255,255); }
        </style></head>
        <body><a href="#abc">top</a> &#123;
        <td style="color: #333">x</td><font color="#FF0000">y</font></body></html>"##;

        let colors: Vec<String> = extract_colors(markup)
            .into_iter()
            .map(|o| o.color.to_string())
            .collect();

        assert_eq!(colors, vec!["#1e3a8a", "#ffffff", "#333333", "#ff0000"]);
    }

    #[test]
    fn test_media_query_nested_declarations() {
        let markup = "<style>@media print { .total { color: #0a0a0a } }</style>";
        let set = color_set(markup);
        assert!(set.contains(&Color::parse("#0a0a0a").unwrap()));
        assert_eq!(set.len(), 1);
    }
}
