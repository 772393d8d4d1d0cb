//! Print optimization with a local layout estimate and a safe fallback.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::layout::{self, LayoutEstimate};
use super::prompts::{optimization_prompt, optimization_schema, OPTIMIZER_SYSTEM};
use super::{non_empty_markup, Optimizer};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{
    Candidate, OptimizationAnalysis, OptimizedArtifact, PageConfig, QualityRequirements,
};
use crate::errors::ServiceError;
use crate::provider::CompletionRequest;
use crate::resilience::ResilientClient;
use crate::utils::markup::{balance_errors, numeric_tokens, visible_text};

#[derive(Debug, Default, Deserialize)]
struct ReplyAnalysis {
    #[serde(default)]
    estimated_pages: Option<u32>,
    #[serde(default)]
    adjustments: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OptimizationReply {
    #[serde(deserialize_with = "non_empty_markup")]
    html_optimized: String,
    #[serde(default)]
    analysis: ReplyAnalysis,
}

/// Optimizer backed by a [`ResilientClient`].
///
/// Non-fatal service errors and optimized markup that breaks the document
/// both yield the validated candidate unchanged with `fallback = true`.
#[derive(Debug, Clone)]
pub struct LlmOptimizer {
    client: Arc<ResilientClient>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmOptimizer {
    /// Creates an optimizer using the optimizer settings of `config`.
    #[must_use]
    pub fn new(client: Arc<ResilientClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            temperature: config.optimizer_temperature,
            max_tokens: config.max_tokens,
            timeout: config.per_stage_timeout(),
        }
    }

    fn fallback(candidate: &Candidate, estimate: &LayoutEstimate, warning: String) -> OptimizedArtifact {
        let mut warnings = vec![warning];
        warnings.extend(estimate.warnings());
        OptimizedArtifact::new(
            candidate.markup.clone(),
            OptimizationAnalysis {
                estimated_pages: estimate.estimated_pages,
                adjustments: Vec::new(),
                warnings,
                fallback: true,
            },
        )
    }
}

/// Why optimized markup cannot replace the candidate, if it cannot.
fn rejection(candidate: &Candidate, optimized: &str) -> Option<String> {
    let errors = balance_errors(optimized);
    if let Some(first) = errors.first() {
        return Some(format!("optimized markup is not well formed ({first})"));
    }

    let kept = numeric_tokens(&visible_text(optimized));
    let lost: Vec<String> = numeric_tokens(&visible_text(&candidate.markup))
        .into_iter()
        .filter(|token| !kept.contains(token))
        .collect();
    if lost.is_empty() {
        None
    } else {
        Some(format!(
            "optimized markup dropped figures from the document ({})",
            lost.join(", ")
        ))
    }
}

#[async_trait]
impl Optimizer for LlmOptimizer {
    #[instrument(skip_all, fields(attempt = candidate.attempt))]
    async fn optimize(
        &self,
        candidate: &Candidate,
        page: &PageConfig,
        quality: &QualityRequirements,
        cancel: &CancellationToken,
    ) -> Result<OptimizedArtifact, ServiceError> {
        let estimate = layout::estimate(&candidate.markup, page, quality);
        let completion = CompletionRequest::new(
            OPTIMIZER_SYSTEM,
            optimization_prompt(candidate, page, quality, &estimate),
        )
        .with_schema_hint(optimization_schema())
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let reply: OptimizationReply = match self.client.complete(&completion, self.timeout, cancel).await {
            Ok(reply) => reply,
            Err(e) if e.is_pipeline_fatal() => return Err(e),
            Err(e) => {
                warn!(kind = %e.kind, "Optimizer unavailable, keeping the validated candidate");
                return Ok(Self::fallback(
                    candidate,
                    &estimate,
                    format!("optimization skipped after {}: {}", e.kind, e.message),
                ));
            }
        };

        if let Some(reason) = rejection(candidate, &reply.html_optimized) {
            warn!(%reason, "Discarding optimized markup");
            return Ok(Self::fallback(candidate, &estimate, reason));
        }

        let mut analysis = OptimizationAnalysis {
            estimated_pages: reply
                .analysis
                .estimated_pages
                .filter(|pages| *pages > 0)
                .unwrap_or(estimate.estimated_pages),
            adjustments: reply.analysis.adjustments,
            warnings: reply.analysis.warnings,
            fallback: false,
        };
        analysis.warnings.extend(estimate.warnings());

        let markup = match layout::ensure_page_rule(&reply.html_optimized, page, quality) {
            Some(fix) => {
                analysis.adjustments.push(fix.adjustment);
                fix.markup
            }
            None => reply.html_optimized,
        };

        info!(
            pages = analysis.estimated_pages,
            adjustments = analysis.adjustments.len(),
            "Document optimized"
        );
        Ok(OptimizedArtifact::new(markup, analysis))
    }
}
