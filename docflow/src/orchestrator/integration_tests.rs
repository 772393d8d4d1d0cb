//! End-to-end runs over scripted services and scripted stages.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{Orchestrator, PipelineInput};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{IssueCode, PipelineOutcome, PipelineState, ValidationIssue, ValidationVerdict};
use crate::errors::{FailureReason, ProviderFailure, ServiceError, ServiceErrorKind};
use crate::events::{
    CollectingEventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_REGENERATING,
    PIPELINE_STARTED, STAGE_COMPLETED, STAGE_FAILED,
};
use crate::resilience::{RateLimitCoordinator, ResilientClient};
use crate::stages::{mechanical, LlmGenerator, LlmOptimizer, LlmValidator};
use crate::testing::{
    fixtures, replies, ScriptedGenerator, ScriptedOptimizer, ScriptedProvider, ScriptedValidator,
};

struct Services {
    generator: Arc<ScriptedProvider>,
    validator: Arc<ScriptedProvider>,
    optimizer: Arc<ScriptedProvider>,
}

impl Services {
    fn new(generator: ScriptedProvider, validator: ScriptedProvider, optimizer: ScriptedProvider) -> Self {
        Self {
            generator: Arc::new(generator),
            validator: Arc::new(validator),
            optimizer: Arc::new(optimizer),
        }
    }

    fn happy() -> Self {
        Self::new(
            ScriptedProvider::repeating(Ok(replies::generation(&fixtures::filled_markup()))),
            ScriptedProvider::repeating(Ok(replies::review(0.95, &[]))),
            ScriptedProvider::repeating(Ok(replies::optimization(&fixtures::filled_markup(), 1))),
        )
    }

    fn orchestrator(&self, config: &PipelineConfig) -> Orchestrator {
        self.orchestrator_sharing(config, Arc::new(RateLimitCoordinator::new()))
    }

    fn orchestrator_sharing(
        &self,
        config: &PipelineConfig,
        coordinator: Arc<RateLimitCoordinator>,
    ) -> Orchestrator {
        let client = |provider: Arc<ScriptedProvider>| {
            Arc::new(ResilientClient::new(provider, config).with_coordinator(coordinator.clone()))
        };
        Orchestrator::new(
            Arc::new(LlmGenerator::new(client(self.generator.clone()), config)),
            Arc::new(LlmValidator::new(client(self.validator.clone()), config)),
            Arc::new(LlmOptimizer::new(client(self.optimizer.clone()), config)),
            config.clone(),
        )
    }
}

fn scripted(
    generator: &Arc<ScriptedGenerator>,
    validator: &Arc<ScriptedValidator>,
    optimizer: &Arc<ScriptedOptimizer>,
    config: PipelineConfig,
) -> Orchestrator {
    Orchestrator::new(generator.clone(), validator.clone(), optimizer.clone(), config)
}

fn missing_item_verdict() -> ValidationVerdict {
    ValidationVerdict::fail(vec![
        ValidationIssue::mechanical(IssueCode::MissingLineItem, "line item \"Lemon Tart\" is missing from the document"),
        ValidationIssue::mechanical(IssueCode::UnauthorizedColor, "color #ff0000 (#ff0000) is not part of the branding or the template"),
    ])
}

fn assert_artifact_is_faithful(outcome: &PipelineOutcome, input: &PipelineInput) {
    let artifact = outcome.artifact().expect("successful outcome");
    assert!(
        mechanical::unauthorized_colors(&artifact.markup, &input.template, &input.branding).is_empty()
    );
    let text = crate::utils::markup::visible_text(&artifact.markup);
    assert!(mechanical::missing_line_items(&text, &input.request).is_empty());
}

#[tokio::test]
async fn test_happy_path_single_attempt() {
    let services = Services::happy();
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = services
        .orchestrator(&PipelineConfig::default())
        .with_event_sink(sink.clone());
    let input = fixtures::sample_input();

    let outcome = orchestrator.run(&input, &CancellationToken::new()).await;

    assert!(outcome.is_success());
    assert_artifact_is_faithful(&outcome, &input);
    let metadata = outcome.metadata();
    assert_eq!(metadata.attempts, 1);
    assert_eq!(metadata.generator_calls, 1);
    assert_eq!(metadata.validator_calls, 1);
    assert_eq!(metadata.optimizer_calls, 1);
    assert_eq!(metadata.stage_latencies.len(), 3);
    assert!(metadata.finished_at.is_some());
    assert_eq!(metadata.analysis.as_ref().map(|a| a.estimated_pages), Some(1));
    assert_eq!(
        metadata.state_history,
        vec![
            PipelineState::Init,
            PipelineState::Generated,
            PipelineState::ValidatedOk,
            PipelineState::Optimized
        ]
    );
    assert_eq!(
        sink.types(),
        vec![
            PIPELINE_STARTED,
            STAGE_COMPLETED,
            STAGE_COMPLETED,
            STAGE_COMPLETED,
            PIPELINE_COMPLETED
        ]
    );
}

#[tokio::test]
async fn test_off_brand_color_triggers_one_regeneration() {
    let services = Services::new(
        ScriptedProvider::new(vec![
            Ok(replies::generation(&fixtures::off_brand_markup())),
            Ok(replies::generation(&fixtures::filled_markup())),
        ]),
        ScriptedProvider::repeating(Ok(replies::review(0.95, &[]))),
        ScriptedProvider::repeating(Ok(replies::optimization(&fixtures::filled_markup(), 1))),
    );
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = services
        .orchestrator(&PipelineConfig::default().with_max_retries(2))
        .with_event_sink(sink.clone());
    let input = fixtures::sample_input();

    let outcome = orchestrator.run(&input, &CancellationToken::new()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.metadata().attempts, 2);
    assert_eq!(outcome.metadata().generator_calls, 2);
    assert_eq!(outcome.metadata().validator_calls, 2);
    assert_eq!(services.generator.calls(), 2);
    assert_eq!(services.validator.calls(), 2);
    assert_eq!(services.optimizer.calls(), 1);
    assert_artifact_is_faithful(&outcome, &input);

    let regeneration_prompt = &services.generator.prompts()[1];
    assert!(regeneration_prompt.contains("ATTEMPT 1 WAS REJECTED"));
    assert!(regeneration_prompt.contains("#ff0000"));

    assert_eq!(
        outcome.metadata().state_history,
        vec![
            PipelineState::Init,
            PipelineState::Generated,
            PipelineState::ValidatedFail,
            PipelineState::Generated,
            PipelineState::ValidatedOk,
            PipelineState::Optimized
        ]
    );
    assert_eq!(sink.count(PIPELINE_REGENERATING), 1);
}

#[tokio::test]
async fn test_quota_on_first_generation_short_circuits() {
    let services = Services::new(
        ScriptedProvider::repeating(Err(ProviderFailure::http(402, "payment required"))),
        ScriptedProvider::repeating(Ok(replies::review(0.95, &[]))),
        ScriptedProvider::repeating(Ok(replies::optimization(&fixtures::filled_markup(), 1))),
    );
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = services
        .orchestrator(&PipelineConfig::default())
        .with_event_sink(sink.clone());

    let outcome = orchestrator
        .run(&fixtures::sample_input(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::QuotaExhausted));
    assert_eq!(services.generator.calls(), 1);
    assert_eq!(services.validator.calls(), 0);
    assert_eq!(services.optimizer.calls(), 0);
    assert_eq!(outcome.metadata().generator_calls, 1);
    assert_eq!(outcome.metadata().validator_calls, 0);
    assert!(outcome.last_issues().is_empty());
    assert_eq!(
        outcome.metadata().state_history,
        vec![PipelineState::Init, PipelineState::Failed]
    );
    assert_eq!(sink.types(), vec![PIPELINE_STARTED, STAGE_FAILED, PIPELINE_FAILED]);
    if let PipelineOutcome::Failure { detail, .. } = &outcome {
        assert!(!detail.contains("payment required"));
    }
}

#[tokio::test]
async fn test_always_invalid_exhausts_retries() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("<p>one</p>".to_string()),
        Ok("<p>two</p>".to_string()),
        Ok("<p>three</p>".to_string()),
    ]));
    let validator = Arc::new(ScriptedValidator::always(missing_item_verdict()));
    let optimizer = Arc::new(ScriptedOptimizer::passthrough());

    let outcome = scripted(&generator, &validator, &optimizer, PipelineConfig::default())
        .run(&fixtures::sample_input(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::MaxRetriesExceeded));
    assert_eq!(outcome.last_issues(), missing_item_verdict().issue_messages().as_slice());
    assert_eq!(generator.calls(), 3);
    assert_eq!(validator.calls(), 3);
    assert_eq!(optimizer.calls(), 0);
    assert_eq!(outcome.metadata().attempts, 3);
    assert_eq!(outcome.metadata().generator_calls, 3);
    assert_eq!(outcome.metadata().optimizer_calls, 0);
    assert_eq!(outcome.metadata().final_state(), PipelineState::Failed);

    let attempts = generator.attempts();
    assert_eq!(
        attempts.iter().map(|a| a.number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(attempts[0].prior.is_none());
    assert_eq!(attempts[1].prior_issues(), missing_item_verdict().issue_messages().as_slice());
    assert_eq!(attempts[2].prior.as_ref().map(|p| p.markup.as_str()), Some("<p>two</p>"));
}

#[tokio::test]
async fn test_generator_invocations_are_bounded() {
    for max_retries in [0, 1, 4] {
        let generator = Arc::new(ScriptedGenerator::always("<p>x</p>"));
        let validator = Arc::new(ScriptedValidator::always(missing_item_verdict()));
        let optimizer = Arc::new(ScriptedOptimizer::passthrough());
        let config = PipelineConfig::default().with_max_retries(max_retries);

        let outcome = scripted(&generator, &validator, &optimizer, config)
            .run(&fixtures::sample_input(), &CancellationToken::new())
            .await;

        assert!(!outcome.is_success());
        assert_eq!(generator.calls(), max_retries + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_optimizer_returns_validated_candidate() {
    let services = Services::new(
        ScriptedProvider::repeating(Ok(replies::generation(&fixtures::filled_markup()))),
        ScriptedProvider::repeating(Ok(replies::review(0.95, &[]))),
        ScriptedProvider::repeating(Err(ProviderFailure::http(503, "upstream down"))),
    );
    let input = fixtures::sample_input();

    let outcome = services
        .orchestrator(&PipelineConfig::default())
        .run(&input, &CancellationToken::new())
        .await;

    assert!(outcome.is_success());
    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.markup, fixtures::filled_markup());
    assert!(artifact.analysis.fallback);
    assert!(artifact.analysis.warnings.iter().any(|w| w.contains("unreachable")));
    assert_eq!(services.optimizer.calls(), 4);
    assert_artifact_is_faithful(&outcome, &input);
}

#[tokio::test]
async fn test_fatal_optimizer_error_fails_run() {
    let generator = Arc::new(ScriptedGenerator::always(fixtures::filled_markup()));
    let validator = Arc::new(ScriptedValidator::always(ValidationVerdict::pass(0.9)));
    let optimizer = Arc::new(ScriptedOptimizer::failing(ServiceError::new(
        ServiceErrorKind::SchemaViolation,
        "reply did not match",
    )));

    let outcome = scripted(&generator, &validator, &optimizer, PipelineConfig::default())
        .run(&fixtures::sample_input(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::SchemaViolation));
    assert_eq!(optimizer.calls(), 1);
    assert_eq!(
        outcome.metadata().state_history.last(),
        Some(&PipelineState::Failed)
    );
}

#[tokio::test]
async fn test_validator_service_error_keeps_previous_issues() {
    let generator = Arc::new(ScriptedGenerator::always("<p>x</p>"));
    let validator = Arc::new(ScriptedValidator::new(vec![
        Ok(missing_item_verdict()),
        Err(ServiceError::unreachable("connection reset").with_attempts(4)),
    ]));
    let optimizer = Arc::new(ScriptedOptimizer::passthrough());

    let outcome = scripted(&generator, &validator, &optimizer, PipelineConfig::default())
        .run(&fixtures::sample_input(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::Unreachable));
    assert_eq!(outcome.last_issues().len(), 2);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_ends_cancelled() {
    let services = Services::new(
        ScriptedProvider::repeating(Err(ProviderFailure::http(429, ""))),
        ScriptedProvider::repeating(Ok(replies::review(0.95, &[]))),
        ScriptedProvider::repeating(Ok(replies::optimization(&fixtures::filled_markup(), 1))),
    );
    let orchestrator = Arc::new(services.orchestrator(&PipelineConfig::default()));
    let cancel = Arc::new(CancellationToken::new());

    let task = {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run(&fixtures::sample_input(), &cancel).await })
    };
    tokio::time::sleep(Duration::from_secs(7)).await;
    cancel.cancel("caller went away");

    let outcome = task.await.unwrap();
    assert_eq!(outcome.failure_reason(), Some(FailureReason::Cancelled));
    assert!(outcome.artifact().is_none());
    assert_eq!(services.generator.calls(), 2);
    assert_eq!(services.validator.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let generator = Arc::new(ScriptedGenerator::always("<p>x</p>"));
    let validator = Arc::new(ScriptedValidator::always(ValidationVerdict::pass(0.9)));
    let optimizer = Arc::new(ScriptedOptimizer::passthrough());
    let cancel = CancellationToken::new();
    cancel.cancel("shutdown");

    let outcome = scripted(&generator, &validator, &optimizer, PipelineConfig::default())
        .run(&fixtures::sample_input(), &cancel)
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::Cancelled));
    assert_eq!(generator.calls(), 0);
    if let PipelineOutcome::Failure { detail, .. } = &outcome {
        assert!(detail.contains("shutdown"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_shared_coordinator_delays_concurrent_run() {
    let coordinator = Arc::new(RateLimitCoordinator::new());
    let first = Services::new(
        ScriptedProvider::new(vec![
            Err(ProviderFailure::http(429, "")),
            Ok(replies::generation(&fixtures::filled_markup())),
        ]),
        ScriptedProvider::repeating(Ok(replies::review(0.95, &[]))),
        ScriptedProvider::repeating(Ok(replies::optimization(&fixtures::filled_markup(), 1))),
    );
    let second = Services::happy();
    let config = PipelineConfig::default();
    let orchestrator_a = first.orchestrator_sharing(&config, coordinator.clone());
    let orchestrator_b = second.orchestrator_sharing(&config, coordinator);
    let input = fixtures::sample_input();
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let (a, b) = tokio::join!(orchestrator_a.run(&input, &cancel), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        orchestrator_b.run(&input, &cancel).await
    });

    assert!(a.is_success());
    assert!(b.is_success());
    assert_eq!(
        second.generator.first_call_at().unwrap() - started,
        Duration::from_secs(5)
    );
}

#[tokio::test]
async fn test_identical_regenerations_are_counted_as_stagnant() {
    let generator = Arc::new(ScriptedGenerator::always("<p>same</p>"));
    let validator = Arc::new(ScriptedValidator::always(missing_item_verdict()));
    let optimizer = Arc::new(ScriptedOptimizer::passthrough());

    let outcome = scripted(&generator, &validator, &optimizer, PipelineConfig::default())
        .run(&fixtures::sample_input(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.metadata().stagnant_attempts, 2);
    assert_eq!(outcome.failure_reason(), Some(FailureReason::MaxRetriesExceeded));
}

#[tokio::test]
async fn test_run_many_preserves_order() {
    let services = Services::happy();
    let orchestrator = services.orchestrator(&PipelineConfig::default());
    let inputs = vec![fixtures::sample_input(), fixtures::sample_input()];

    let outcomes = orchestrator
        .run_many(&inputs, 2, &CancellationToken::new())
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(PipelineOutcome::is_success));
    assert_ne!(outcomes[0].metadata().run_id, outcomes[1].metadata().run_id);
    assert_eq!(services.generator.calls(), 2);
}
