//! Print layout inputs and the optimized artifact.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical paper size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSize {
    /// 210 × 297 mm.
    #[default]
    A4,
    /// 8.5 × 11 in.
    Letter,
    /// 8.5 × 14 in.
    Legal,
}

impl PageSize {
    /// Portrait width and height in millimetres.
    #[must_use]
    pub fn dimensions_mm(&self) -> (f64, f64) {
        match self {
            Self::A4 => (210.0, 297.0),
            Self::Letter => (215.9, 279.4),
            Self::Legal => (215.9, 355.6),
        }
    }

    /// CSS `@page size` keyword.
    #[must_use]
    pub fn css_name(&self) -> &'static str {
        match self {
            Self::A4 => "A4",
            Self::Letter => "letter",
            Self::Legal => "legal",
        }
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Taller than wide.
    #[default]
    Portrait,
    /// Wider than tall.
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portrait => write!(f, "portrait"),
            Self::Landscape => write!(f, "landscape"),
        }
    }
}

/// Target page geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    /// Paper size.
    #[serde(default)]
    pub size: PageSize,
    /// Orientation.
    #[serde(default)]
    pub orientation: Orientation,
    /// Margin applied on every side, in millimetres.
    #[serde(default = "default_margin_mm")]
    pub margin_mm: f64,
}

fn default_margin_mm() -> f64 {
    15.0
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: PageSize::default(),
            orientation: Orientation::default(),
            margin_mm: default_margin_mm(),
        }
    }
}

impl PageConfig {
    /// Creates an A4 portrait config with default margins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the paper size.
    #[must_use]
    pub fn with_size(mut self, size: PageSize) -> Self {
        self.size = size;
        self
    }

    /// Sets the orientation.
    #[must_use]
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Sets the margin.
    #[must_use]
    pub fn with_margin_mm(mut self, margin_mm: f64) -> Self {
        self.margin_mm = margin_mm;
        self
    }

    /// Page width and height in millimetres, honoring orientation.
    #[must_use]
    pub fn page_mm(&self) -> (f64, f64) {
        let (w, h) = self.size.dimensions_mm();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }

    /// Printable width and height once `margin_mm` is removed on each side.
    #[must_use]
    pub fn printable_mm(&self, min_margin_mm: f64) -> (f64, f64) {
        let margin = self.margin_mm.max(min_margin_mm);
        let (w, h) = self.page_mm();
        ((w - 2.0 * margin).max(1.0), (h - 2.0 * margin).max(1.0))
    }
}

/// Print quality constraints the optimizer must meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRequirements {
    /// Smallest margin allowed, in millimetres.
    #[serde(default = "default_min_margin_mm")]
    pub min_margin_mm: f64,
    /// Repeat table headers on every page.
    #[serde(default = "default_true")]
    pub repeat_table_headers: bool,
    /// Largest table width, as a percentage of printable width.
    #[serde(default = "default_max_table_width_pct")]
    pub max_table_width_pct: f64,
    /// Whether a table row may be split across pages.
    #[serde(default)]
    pub allow_row_split: bool,
}

fn default_min_margin_mm() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_max_table_width_pct() -> f64 {
    100.0
}

impl Default for QualityRequirements {
    fn default() -> Self {
        Self {
            min_margin_mm: default_min_margin_mm(),
            repeat_table_headers: true,
            max_table_width_pct: default_max_table_width_pct(),
            allow_row_split: false,
        }
    }
}

impl QualityRequirements {
    /// Describes the requirements for prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "minimum margin: {}mm\nrepeat table headers on every page: {}\nmaximum table width: {}% of printable width\nrows may split across pages: {}",
            self.min_margin_mm,
            self.repeat_table_headers,
            self.max_table_width_pct,
            self.allow_row_split
        )
    }
}

/// The optimizer's account of what it did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationAnalysis {
    /// Estimated number of printed pages.
    pub estimated_pages: u32,
    /// Presentation changes applied.
    #[serde(default)]
    pub adjustments: Vec<String>,
    /// Warnings for the caller.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// True when the validated candidate was returned unmodified.
    #[serde(default)]
    pub fallback: bool,
}

/// Final print-ready markup plus its analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedArtifact {
    /// Final markup.
    pub markup: String,
    /// What the optimizer did.
    pub analysis: OptimizationAnalysis,
}

impl OptimizedArtifact {
    /// Creates an artifact.
    #[must_use]
    pub fn new(markup: impl Into<String>, analysis: OptimizationAnalysis) -> Self {
        Self {
            markup: markup.into(),
            analysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landscape_swaps_dimensions() {
        let page = PageConfig::new().with_orientation(Orientation::Landscape);
        assert_eq!(page.page_mm(), (297.0, 210.0));
    }

    #[test]
    fn test_printable_uses_larger_margin() {
        let page = PageConfig::new().with_margin_mm(5.0);
        let (w, h) = page.printable_mm(10.0);
        assert!((w - 190.0).abs() < 1e-9);
        assert!((h - 277.0).abs() < 1e-9);
    }

    #[test]
    fn test_page_size_serialize() {
        let json = serde_json::to_string(&PageSize::Letter).unwrap();
        assert_eq!(json, r#""letter""#);
    }
}
