//! Inputs of one orchestration run.

use serde::{Deserialize, Serialize};

use crate::core::{BrandingConfig, GenerationRequest, PageConfig, QualityRequirements, Template};

/// Everything a run needs. Immutable for the run's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    /// Template to fill.
    pub template: Template,
    /// Authorized palette.
    pub branding: BrandingConfig,
    /// Data to fill the template with.
    pub request: GenerationRequest,
    /// Target page.
    #[serde(default)]
    pub page_config: PageConfig,
    /// Print quality requirements.
    #[serde(default)]
    pub quality: QualityRequirements,
}

impl PipelineInput {
    /// Creates an input with the default page and quality settings.
    #[must_use]
    pub fn new(template: Template, branding: BrandingConfig, request: GenerationRequest) -> Self {
        Self {
            template,
            branding,
            request,
            page_config: PageConfig::default(),
            quality: QualityRequirements::default(),
        }
    }

    /// Sets the page configuration.
    #[must_use]
    pub fn with_page_config(mut self, page_config: PageConfig) -> Self {
        self.page_config = page_config;
        self
    }

    /// Sets the quality requirements.
    #[must_use]
    pub fn with_quality(mut self, quality: QualityRequirements) -> Self {
        self.quality = quality;
        self
    }
}
