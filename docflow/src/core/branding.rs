//! Authorized visual identity for generated documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::color::Color;

/// The palette and typography a document may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingConfig {
    /// Main brand color.
    pub primary_color: String,
    /// Optional secondary color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    /// Background of table and section headers.
    pub header_background: String,
    /// Text color used on headers.
    pub header_text_color: String,
    /// Further authorized colors (borders, zebra rows).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accent_colors: Vec<String>,
    /// Preferred font family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Base font size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_font_size_pt: Option<f32>,
}

impl BrandingConfig {
    /// Creates a branding config from the three required colors.
    #[must_use]
    pub fn new(
        primary_color: impl Into<String>,
        header_background: impl Into<String>,
        header_text_color: impl Into<String>,
    ) -> Self {
        Self {
            primary_color: primary_color.into(),
            secondary_color: None,
            header_background: header_background.into(),
            header_text_color: header_text_color.into(),
            accent_colors: Vec::new(),
            font_family: None,
            base_font_size_pt: None,
        }
    }

    /// Sets the secondary color.
    #[must_use]
    pub fn with_secondary_color(mut self, color: impl Into<String>) -> Self {
        self.secondary_color = Some(color.into());
        self
    }

    /// Adds an accent color.
    #[must_use]
    pub fn with_accent_color(mut self, color: impl Into<String>) -> Self {
        self.accent_colors.push(color.into());
        self
    }

    /// Sets the font family.
    #[must_use]
    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = Some(family.into());
        self
    }

    /// Sets the base font size.
    #[must_use]
    pub fn with_base_font_size(mut self, size_pt: f32) -> Self {
        self.base_font_size_pt = Some(size_pt);
        self
    }

    /// Returns every authorized color, normalized. Unparseable entries are
    /// ignored.
    #[must_use]
    pub fn authorized_colors(&self) -> BTreeSet<Color> {
        [
            Some(&self.primary_color),
            self.secondary_color.as_ref(),
            Some(&self.header_background),
            Some(&self.header_text_color),
        ]
        .into_iter()
        .flatten()
        .chain(self.accent_colors.iter())
        .filter_map(|raw| Color::parse(raw))
        .collect()
    }

    /// Describes the branding for prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!("primary color: {}", self.primary_color),
            format!("header background: {}", self.header_background),
            format!("header text color: {}", self.header_text_color),
        ];
        if let Some(ref secondary) = self.secondary_color {
            lines.push(format!("secondary color: {secondary}"));
        }
        if !self.accent_colors.is_empty() {
            lines.push(format!("accent colors: {}", self.accent_colors.join(", ")));
        }
        if let Some(ref family) = self.font_family {
            lines.push(format!("font family: {family}"));
        }
        if let Some(size) = self.base_font_size_pt {
            lines.push(format!("base font size: {size}pt"));
        }
        lines.join("\n")
    }
}
