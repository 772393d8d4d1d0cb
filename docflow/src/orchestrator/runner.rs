//! The validation-gated generation loop.

use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::input::PipelineInput;
use super::recorder::RunRecorder;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{
    Candidate, GenerationAttempt, PipelineOutcome, PipelineState, PriorAttempt, StageName,
};
use crate::errors::{FailureReason, ServiceError};
use crate::events::{EventSink, NoOpEventSink, PIPELINE_REGENERATING, PIPELINE_STARTED};
use crate::observability::SpanTimer;
use crate::resilience::ResilientClient;
use crate::stages::{Generator, LlmGenerator, LlmOptimizer, LlmValidator, Optimizer, Validator};

/// Drives Generator → Validator → Optimizer for one request at a time.
///
/// A candidate reaches the optimizer only after passing validation. Failed
/// validation regenerates with the verdict's issues until
/// `max_retries + 1` generator invocations have been spent.
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    validator: Arc<dyn Validator>,
    optimizer: Arc<dyn Optimizer>,
    sink: Arc<dyn EventSink>,
    config: PipelineConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("generator", &self.generator)
            .field("validator", &self.validator)
            .field("optimizer", &self.optimizer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator from three stages. Events are discarded
    /// until a sink is set.
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generator>,
        validator: Arc<dyn Validator>,
        optimizer: Arc<dyn Optimizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            generator,
            validator,
            optimizer,
            sink: Arc::new(NoOpEventSink),
            config,
        }
    }

    /// Creates an orchestrator whose three stages share `client`.
    #[must_use]
    pub fn with_client(client: Arc<ResilientClient>, config: PipelineConfig) -> Self {
        Self::new(
            Arc::new(LlmGenerator::new(client.clone(), &config)),
            Arc::new(LlmValidator::new(client.clone(), &config)),
            Arc::new(LlmOptimizer::new(client, &config)),
            config,
        )
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one request to a terminal outcome. Never panics and never
    /// returns a half-made candidate.
    pub async fn run(&self, input: &PipelineInput, cancel: &CancellationToken) -> PipelineOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id);
        self.drive(run_id, input, cancel).instrument(span).await
    }

    /// Runs independent requests with at most `concurrency` in flight,
    /// returning outcomes in input order.
    pub async fn run_many(
        &self,
        inputs: &[PipelineInput],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<PipelineOutcome> {
        stream::iter(inputs)
            .map(|input| self.run(input, cancel))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn drive(
        &self,
        run_id: Uuid,
        input: &PipelineInput,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let max_attempts = self.config.max_generation_attempts();
        let mut run = RunRecorder::start(run_id, self.sink.clone());
        info!(max_attempts, items = input.request.items.len(), "Pipeline started");
        run.emit(
            PIPELINE_STARTED,
            json!({
                "max_attempts": max_attempts,
                "items": input.request.items.len(),
                "placeholders": input.template.placeholders().len(),
            }),
        )
        .await;

        let mut attempt = GenerationAttempt::first();
        let mut last_issues: Vec<String> = Vec::new();
        let mut previous_fingerprint: Option<String> = None;

        let validated = loop {
            if cancel.is_cancelled() {
                return cancelled(run, cancel, last_issues).await;
            }

            run.metadata_mut().attempts = attempt.number;
            run.metadata_mut().generator_calls += 1;
            let timer = SpanTimer::start("generator");
            let generated = self
                .generator
                .generate(&input.template, &input.request, &attempt, cancel)
                .await;
            let elapsed = timer.finish();
            let candidate = match generated {
                Ok(candidate) => candidate,
                Err(e) => {
                    run.stage_failed(StageName::Generator, attempt.number, elapsed, &e).await;
                    return service_failure(run, StageName::Generator, &e, last_issues).await;
                }
            };
            run.stage_completed(StageName::Generator, attempt.number, elapsed).await;
            run.transition(PipelineState::Generated);

            if previous_fingerprint.as_deref() == Some(candidate.fingerprint.as_str()) {
                run.metadata_mut().stagnant_attempts += 1;
                warn!(
                    attempt = attempt.number,
                    "Regenerated candidate is identical to the previous attempt"
                );
            }
            previous_fingerprint = Some(candidate.fingerprint.clone());

            if cancel.is_cancelled() {
                return cancelled(run, cancel, last_issues).await;
            }

            run.metadata_mut().validator_calls += 1;
            let timer = SpanTimer::start("validator");
            let judged = self
                .validator
                .validate(&candidate, &input.template, &input.branding, &input.request, cancel)
                .await;
            let elapsed = timer.finish();
            let verdict = match judged {
                Ok(verdict) => verdict,
                Err(e) => {
                    run.stage_failed(StageName::Validator, attempt.number, elapsed, &e).await;
                    return service_failure(run, StageName::Validator, &e, last_issues).await;
                }
            };
            run.stage_completed(StageName::Validator, attempt.number, elapsed).await;

            if verdict.is_valid {
                run.transition(PipelineState::ValidatedOk);
                info!(
                    attempt = attempt.number,
                    similarity = verdict.similarity_score,
                    "Candidate validated"
                );
                break candidate;
            }

            run.transition(PipelineState::ValidatedFail);
            last_issues = verdict.issue_messages();
            info!(
                attempt = attempt.number,
                issues = last_issues.len(),
                similarity = verdict.similarity_score,
                "Candidate rejected"
            );

            if attempt.number >= max_attempts {
                let detail = format!(
                    "document failed validation on all {max_attempts} attempts ({} issue(s) on the last)",
                    last_issues.len()
                );
                return run.fail(FailureReason::MaxRetriesExceeded, detail, last_issues).await;
            }

            run.emit(
                PIPELINE_REGENERATING,
                json!({
                    "attempt": attempt.number + 1,
                    "issues": &last_issues,
                }),
            )
            .await;
            attempt = next_attempt(&attempt, &candidate, last_issues.clone());
        };

        if cancel.is_cancelled() {
            return cancelled(run, cancel, last_issues).await;
        }

        run.metadata_mut().optimizer_calls += 1;
        let timer = SpanTimer::start("optimizer");
        let optimized = self
            .optimizer
            .optimize(&validated, &input.page_config, &input.quality, cancel)
            .await;
        let elapsed = timer.finish();
        match optimized {
            Ok(artifact) => {
                run.stage_completed(StageName::Optimizer, attempt.number, elapsed).await;
                run.succeed(artifact).await
            }
            Err(e) => {
                run.stage_failed(StageName::Optimizer, attempt.number, elapsed, &e).await;
                service_failure(run, StageName::Optimizer, &e, Vec::new()).await
            }
        }
    }
}

fn next_attempt(current: &GenerationAttempt, rejected: &Candidate, issues: Vec<String>) -> GenerationAttempt {
    GenerationAttempt {
        number: current.number + 1,
        prior: Some(PriorAttempt {
            markup: rejected.markup.clone(),
            issues,
        }),
    }
}

async fn service_failure(
    run: RunRecorder,
    stage: StageName,
    err: &ServiceError,
    last_issues: Vec<String>,
) -> PipelineOutcome {
    let detail = format!("{stage} failed after {} call(s): {err}", err.attempts.max(1));
    run.fail(FailureReason::from(err), detail, last_issues).await
}

async fn cancelled(
    run: RunRecorder,
    cancel: &CancellationToken,
    last_issues: Vec<String>,
) -> PipelineOutcome {
    let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
    run.fail(FailureReason::Cancelled, format!("run cancelled: {reason}"), last_issues)
        .await
}
