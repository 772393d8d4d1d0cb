//! Template filling through the completion service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::prompts::{generation_prompt, generation_schema, GENERATOR_SYSTEM};
use super::{non_empty_markup, Generator};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{Candidate, GenerationAttempt, GenerationRequest, Template};
use crate::errors::ServiceError;
use crate::provider::CompletionRequest;
use crate::resilience::ResilientClient;

#[derive(Debug, Deserialize)]
struct GenerationReply {
    #[serde(deserialize_with = "non_empty_markup")]
    html_generated: String,
    #[serde(default)]
    metadata: Value,
}

/// Generator backed by a [`ResilientClient`]. Deterministic (temperature 0
/// by default).
#[derive(Debug, Clone)]
pub struct LlmGenerator {
    client: Arc<ResilientClient>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmGenerator {
    /// Creates a generator using the generator settings of `config`.
    #[must_use]
    pub fn new(client: Arc<ResilientClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            temperature: config.generator_temperature,
            max_tokens: config.max_tokens,
            timeout: config.per_stage_timeout(),
        }
    }

    fn request(
        &self,
        template: &Template,
        request: &GenerationRequest,
        attempt: &GenerationAttempt,
    ) -> CompletionRequest {
        CompletionRequest::new(GENERATOR_SYSTEM, generation_prompt(template, request, attempt))
            .with_schema_hint(generation_schema())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    #[instrument(skip_all, fields(attempt = attempt.number))]
    async fn generate(
        &self,
        template: &Template,
        request: &GenerationRequest,
        attempt: &GenerationAttempt,
        cancel: &CancellationToken,
    ) -> Result<Candidate, ServiceError> {
        let completion = self.request(template, request, attempt);
        let reply: GenerationReply = self.client.complete(&completion, self.timeout, cancel).await?;

        let candidate = Candidate::new(reply.html_generated, attempt.number)
            .with_corrections(attempt.prior_issues().to_vec())
            .with_metadata(reply.metadata);
        debug!(
            bytes = candidate.markup.len(),
            fingerprint = %&candidate.fingerprint[..12],
            "Candidate generated"
        );
        Ok(candidate)
    }
}
