//! Local print-layout estimate used to brief the optimizer and to fill in
//! the analysis when the optimizer is unavailable.

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::core::{PageConfig, QualityRequirements};
use crate::utils::static_regex;

static CSS_WIDTH: OnceLock<Regex> = OnceLock::new();
static ATTR_WIDTH: OnceLock<Regex> = OnceLock::new();
static PAGE_RULE: OnceLock<Regex> = OnceLock::new();
static MARGIN_DECL: OnceLock<Regex> = OnceLock::new();
static LENGTH: OnceLock<Regex> = OnceLock::new();

const ROW_MM: f64 = 8.0;
const LINE_MM: f64 = 5.0;
const BLOCK_GAP_MM: f64 = 2.0;
const CHAR_MM: f64 = 2.1;
const IMAGE_MM: f64 = 40.0;
const RULE_MM: f64 = 4.0;
const PX_TO_MM: f64 = 0.2646;

const TEXT_BLOCKS: &[&str] = &[
    "p", "li", "address", "blockquote", "pre", "dd", "dt", "caption", "figcaption",
];

/// A table whose declared width exceeds the allowed printable width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OversizedTable {
    /// 1-based position among the document's tables.
    pub index: usize,
    /// Declared width in millimetres.
    pub width_mm: f64,
}

/// Rough content height and page count for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEstimate {
    /// Estimated content height.
    pub content_height_mm: f64,
    /// Printable width of one page.
    pub printable_width_mm: f64,
    /// Printable height of one page.
    pub printable_height_mm: f64,
    /// Estimated number of pages, at least 1.
    pub estimated_pages: u32,
    /// Table rows counted.
    pub table_rows: usize,
    /// Tables wider than the allowed width.
    pub oversized_tables: Vec<OversizedTable>,
}

impl LayoutEstimate {
    /// True when content overflows one page.
    #[must_use]
    pub fn needs_page_breaks(&self) -> bool {
        self.estimated_pages > 1
    }

    /// Warnings derived from the estimate alone.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.oversized_tables
            .iter()
            .map(|t| {
                format!(
                    "table {} is declared {:.0}mm wide but the printable width is {:.0}mm",
                    t.index, t.width_mm, self.printable_width_mm
                )
            })
            .collect()
    }

    /// Summary for the optimizer prompt.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!(
                "printable area: {:.0}mm x {:.0}mm",
                self.printable_width_mm, self.printable_height_mm
            ),
            format!(
                "estimated content height: {:.0}mm ({} page(s))",
                self.content_height_mm, self.estimated_pages
            ),
            format!("table rows: {}", self.table_rows),
        ];
        lines.extend(self.warnings());
        lines.join("\n")
    }
}

/// Estimates how `markup` lays out on `page`.
#[must_use]
pub fn estimate(markup: &str, page: &PageConfig, quality: &QualityRequirements) -> LayoutEstimate {
    let (width, height) = page.printable_mm(quality.min_margin_mm);
    let chars_per_line = (width / CHAR_MM).max(10.0);
    let width_limit = width * quality.max_table_width_pct / 100.0;

    let document = Html::parse_document(markup);
    let mut content = 0.0;
    let mut table_rows = 0;
    let mut tables = 0;
    let mut oversized_tables = Vec::new();

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let name = element.value().name();
        match name {
            "tr" => {
                table_rows += 1;
                content += ROW_MM;
            }
            "h1" => content += 14.0,
            "h2" => content += 11.0,
            "h3" | "h4" | "h5" | "h6" => content += 9.0,
            "img" => content += IMAGE_MM,
            "hr" => content += RULE_MM,
            "table" => {
                tables += 1;
                if let Some(width_mm) = declared_width_mm(element, width) {
                    if width_mm > width_limit + 0.5 {
                        oversized_tables.push(OversizedTable {
                            index: tables,
                            width_mm,
                        });
                    }
                }
            }
            _ if TEXT_BLOCKS.contains(&name) && !inside_table_cell(element) => {
                let words = element.text().flat_map(str::split_whitespace).count().max(1);
                let chars = words as f64 * 6.0;
                let lines = (chars / chars_per_line).ceil().max(1.0);
                content += lines * LINE_MM + BLOCK_GAP_MM;
            }
            _ => {}
        }
    }

    let pages = (content / height).ceil().max(1.0);
    LayoutEstimate {
        content_height_mm: content,
        printable_width_mm: width,
        printable_height_mm: height,
        estimated_pages: if pages >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            pages as u32
        },
        table_rows,
        oversized_tables,
    }
}

fn inside_table_cell(element: ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|el| matches!(el.name(), "td" | "th"))
    })
}

fn declared_width_mm(table: ElementRef<'_>, printable_width: f64) -> Option<f64> {
    if let Some(style) = table.value().attr("style") {
        let css = static_regex(
            &CSS_WIDTH,
            r"(?i)(?:^|;)\s*(?:min-)?width\s*:\s*([\d.]+)\s*(px|mm|cm|in|%)?",
        );
        if let Some(caps) = css.captures(style) {
            return to_mm(&caps[1], caps.get(2).map(|m| m.as_str()), printable_width);
        }
    }
    let attr = table.value().attr("width")?;
    let caps = static_regex(&ATTR_WIDTH, r"^\s*([\d.]+)\s*(px|%)?\s*$").captures(attr)?;
    to_mm(&caps[1], caps.get(2).map(|m| m.as_str()), printable_width)
}

fn to_mm(value: &str, unit: Option<&str>, printable_width: f64) -> Option<f64> {
    let value: f64 = value.parse().ok()?;
    let mm = match unit.map(str::to_ascii_lowercase).as_deref() {
        Some("mm") => value,
        Some("cm") => value * 10.0,
        Some("in") => value * 25.4,
        Some("%") => printable_width * value / 100.0,
        _ => value * PX_TO_MM,
    };
    Some(mm)
}

/// The `@page` rule for `page`, using the larger of the configured and the
/// minimum margin.
#[must_use]
pub fn page_rule(page: &PageConfig, quality: &QualityRequirements) -> String {
    format!(
        "@page {{ size: {} {}; margin: {}mm; }}",
        page.size.css_name(),
        page.orientation,
        page.margin_mm.max(quality.min_margin_mm)
    )
}

/// A change made by [`ensure_page_rule`].
#[derive(Debug, Clone, PartialEq)]
pub struct PageRuleFix {
    /// Markup with the rule applied.
    pub markup: String,
    /// Description for the optimization analysis.
    pub adjustment: String,
}

/// Smallest margin declared by any `@page` rule in `markup`, in millimetres.
#[must_use]
pub fn smallest_page_margin(markup: &str) -> Option<f64> {
    let rules = static_regex(&PAGE_RULE, r"(?i)@page\b[^{]*\{([^}]*)\}");
    let decls = static_regex(
        &MARGIN_DECL,
        r"(?i)(?:^|[\s;])margin(?:-(?:top|right|bottom|left))?\s*:\s*([^;}]+)",
    );

    let mut smallest: Option<f64> = None;
    for rule in rules.captures_iter(markup) {
        let Some(body) = rule.get(1) else { continue };
        for decl in decls.captures_iter(body.as_str()) {
            let Some(value) = decl.get(1) else { continue };
            for mm in value.as_str().split_whitespace().filter_map(length_mm) {
                smallest = Some(smallest.map_or(mm, |s| s.min(mm)));
            }
        }
    }
    smallest
}

fn length_mm(token: &str) -> Option<f64> {
    let caps = static_regex(&LENGTH, r"(?i)^(-?\d*\.?\d+)(mm|cm|in|pt|pc|px|q)?$").captures(token)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let mm = match caps.get(2).map(|u| u.as_str().to_ascii_lowercase()).as_deref() {
        None if value.abs() < f64::EPSILON => 0.0,
        None => return None,
        Some("mm") => value,
        Some("cm") => value * 10.0,
        Some("in") => value * 25.4,
        Some("pt") => value * 25.4 / 72.0,
        Some("pc") => value * 25.4 / 6.0,
        Some("q") => value * 0.25,
        _ => value * PX_TO_MM,
    };
    Some(mm)
}

fn insert_style(markup: &str, at: usize, rule: &str) -> String {
    let style = format!("<style>{rule}</style>");
    let mut out = String::with_capacity(markup.len() + style.len());
    out.push_str(&markup[..at]);
    out.push_str(&style);
    out.push_str(&markup[at..]);
    out
}

/// Makes `markup` print on the configured page with at least the minimum
/// margin.
///
/// Without any `@page` rule, [`page_rule`] is inserted into the head. When
/// existing rules declare no margin, or one under `quality.min_margin_mm`,
/// an overriding margin rule is placed after the last of them. Returns
/// `None` when the markup already complies.
#[must_use]
pub fn ensure_page_rule(
    markup: &str,
    page: &PageConfig,
    quality: &QualityRequirements,
) -> Option<PageRuleFix> {
    let lower = markup.to_ascii_lowercase();

    let Some(last_rule) = lower.rfind("@page") else {
        let rule = page_rule(page, quality);
        let at = lower
            .find("</head")
            .or_else(|| lower.find("<body"))
            .unwrap_or(0);
        return Some(PageRuleFix {
            markup: insert_style(markup, at, &rule),
            adjustment: format!("added {rule}"),
        });
    };

    let found = smallest_page_margin(markup);
    if found.is_some_and(|mm| mm >= quality.min_margin_mm) {
        return None;
    }

    let margin = page.margin_mm.max(quality.min_margin_mm);
    let at = lower[last_rule..]
        .find("</style")
        .map(|close| last_rule + close)
        .and_then(|close| lower[close..].find('>').map(|end| close + end + 1))
        .unwrap_or(markup.len());
    let adjustment = match found {
        Some(mm) => format!(
            "raised @page margin from {}mm to {margin}mm",
            (mm * 10.0).round() / 10.0
        ),
        None => format!("added @page margin of {margin}mm"),
    };
    Some(PageRuleFix {
        markup: insert_style(markup, at, &format!("@page {{ margin: {margin}mm; }}")),
        adjustment,
    })
}
