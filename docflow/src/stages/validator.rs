//! Two-tier validation: local mechanical checks, then one semantic review.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::prompts::{validation_prompt, validation_schema, VALIDATOR_SYSTEM};
use super::{mechanical, Validator};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{
    BrandingConfig, Candidate, GenerationRequest, IssueCode, Template, ValidationIssue,
    ValidationVerdict,
};
use crate::errors::ServiceError;
use crate::provider::CompletionRequest;
use crate::resilience::ResilientClient;

// The service's own `is_valid` is ignored; validity is recomputed from the
// score and the mechanical tier.
#[derive(Debug, Deserialize)]
struct ReviewReply {
    similarity_score: f64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    corrections_made: Vec<String>,
    #[serde(default)]
    quality_score: Option<f64>,
}

/// Validator backed by [`mechanical::check`] and a [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct LlmValidator {
    client: Arc<ResilientClient>,
    threshold: f64,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmValidator {
    /// Creates a validator using the threshold and validator settings of
    /// `config`.
    #[must_use]
    pub fn new(client: Arc<ResilientClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            threshold: config.similarity_threshold,
            temperature: config.validator_temperature,
            max_tokens: config.max_tokens,
            timeout: config.per_stage_timeout(),
        }
    }

    /// The similarity threshold a candidate must reach.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[async_trait]
impl Validator for LlmValidator {
    #[instrument(skip_all, fields(attempt = candidate.attempt))]
    async fn validate(
        &self,
        candidate: &Candidate,
        template: &Template,
        branding: &BrandingConfig,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ValidationVerdict, ServiceError> {
        let mechanical = mechanical::check(&candidate.markup, template, branding, request);
        debug!(issues = mechanical.len(), "Mechanical checks finished");

        let completion =
            CompletionRequest::new(VALIDATOR_SYSTEM, validation_prompt(candidate, template, branding))
                .with_schema_hint(validation_schema())
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens);
        let reply: ReviewReply = self.client.complete(&completion, self.timeout, cancel).await?;

        if !reply.corrections_made.is_empty() {
            debug!(
                count = reply.corrections_made.len(),
                "Semantic review reported corrections it would make"
            );
        }
        let semantic = reply
            .issues
            .into_iter()
            .filter(|issue| !issue.trim().is_empty())
            .map(|issue| ValidationIssue::semantic(IssueCode::SemanticDrift, issue))
            .collect();

        Ok(ValidationVerdict::combine(
            mechanical,
            semantic,
            reply.similarity_score,
            reply.quality_score,
            self.threshold,
        ))
    }
}
