//! Scripted doubles for the completion service and the three stages.
//!
//! Every double replays a script of responses. When one entry is left it
//! is repeated, so `always(..)` style doubles are a single-entry script.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::cancellation::CancellationToken;
use crate::core::{
    BrandingConfig, Candidate, GenerationAttempt, GenerationRequest, OptimizationAnalysis,
    OptimizedArtifact, PageConfig, QualityRequirements, Template, ValidationVerdict,
};
use crate::errors::{ProviderFailure, ServiceError, ServiceErrorKind};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::stages::{Generator, Optimizer, Validator};

#[derive(Debug)]
struct Script<T> {
    steps: Mutex<VecDeque<T>>,
    calls: Mutex<u32>,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<T>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(0),
        }
    }

    fn next(&self) -> Option<T> {
        *self.calls.lock() += 1;
        let mut steps = self.steps.lock();
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

fn exhausted() -> ServiceError {
    ServiceError::new(ServiceErrorKind::Rejected, "script has no responses")
}

async fn pause(latency: Duration, cancel: &CancellationToken) -> Result<(), ServiceError> {
    if latency.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ServiceError::cancelled(cancel.reason().unwrap_or_default())),
        () = tokio::time::sleep(latency) => Ok(()),
    }
}

#[derive(Debug, Clone)]
struct RecordedCall {
    at: Instant,
    request: CompletionRequest,
}

/// A completion provider that replays scripted responses and records
/// every request with its (tokio) arrival time.
#[derive(Debug)]
pub struct ScriptedProvider {
    script: Script<Result<String, ProviderFailure>>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    /// Replays `responses` in order, repeating the last one.
    #[must_use]
    pub fn new(responses: Vec<Result<String, ProviderFailure>>) -> Self {
        Self {
            script: Script::new(responses),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `response`.
    #[must_use]
    pub fn repeating(response: Result<String, ProviderFailure>) -> Self {
        Self::new(vec![response])
    }

    /// Delays every response.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of requests received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.calls.lock().iter().map(|c| c.request.clone()).collect()
    }

    /// The user prompt of every request, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.request.prompt.clone()).collect()
    }

    /// Time between consecutive requests.
    #[must_use]
    pub fn gaps(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .windows(2)
            .map(|w| w[1].at.duration_since(w[0].at))
            .collect()
    }

    /// When the first request arrived.
    #[must_use]
    pub fn first_call_at(&self) -> Option<Instant> {
        self.calls.lock().first().map(|c| c.at)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn send(&self, request: &CompletionRequest) -> Result<String, ProviderFailure> {
        self.calls.lock().push(RecordedCall {
            at: Instant::now(),
            request: request.clone(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script
            .next()
            .unwrap_or_else(|| Err(ProviderFailure::http(410, "script has no responses")))
    }
}

/// A generator that returns scripted markup.
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Script<Result<String, ServiceError>>,
    attempts: Mutex<Vec<GenerationAttempt>>,
    latency: Duration,
}

impl ScriptedGenerator {
    /// Replays `steps` in order, repeating the last one.
    #[must_use]
    pub fn new(steps: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            script: Script::new(steps),
            attempts: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Always returns `markup`.
    #[must_use]
    pub fn always(markup: impl Into<String>) -> Self {
        Self::new(vec![Ok(markup.into())])
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: ServiceError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Sleeps (cancellably) before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of invocations.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.script.calls()
    }

    /// The attempt passed to each invocation.
    #[must_use]
    pub fn attempts(&self) -> Vec<GenerationAttempt> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        _template: &Template,
        _request: &GenerationRequest,
        attempt: &GenerationAttempt,
        cancel: &CancellationToken,
    ) -> Result<Candidate, ServiceError> {
        self.attempts.lock().push(attempt.clone());
        pause(self.latency, cancel).await?;
        let markup = self.script.next().unwrap_or_else(|| Err(exhausted()))?;
        Ok(Candidate::new(markup, attempt.number).with_corrections(attempt.prior_issues().to_vec()))
    }
}

/// A validator that returns scripted verdicts.
#[derive(Debug)]
pub struct ScriptedValidator {
    script: Script<Result<ValidationVerdict, ServiceError>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    /// Replays `steps` in order, repeating the last one.
    #[must_use]
    pub fn new(steps: Vec<Result<ValidationVerdict, ServiceError>>) -> Self {
        Self {
            script: Script::new(steps),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `verdict`.
    #[must_use]
    pub fn always(verdict: ValidationVerdict) -> Self {
        Self::new(vec![Ok(verdict)])
    }

    /// Number of invocations.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.script.calls()
    }

    /// Markup of every candidate judged, in order.
    #[must_use]
    pub fn seen_markup(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn validate(
        &self,
        candidate: &Candidate,
        _template: &Template,
        _branding: &BrandingConfig,
        _request: &GenerationRequest,
        _cancel: &CancellationToken,
    ) -> Result<ValidationVerdict, ServiceError> {
        self.seen.lock().push(candidate.markup.clone());
        self.script.next().unwrap_or_else(|| Err(exhausted()))
    }
}

/// An optimizer that passes the candidate through or fails as scripted.
#[derive(Debug)]
pub struct ScriptedOptimizer {
    script: Script<Result<(), ServiceError>>,
}

impl ScriptedOptimizer {
    /// Returns the candidate unchanged on every call.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            script: Script::new(vec![Ok(())]),
        }
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: ServiceError) -> Self {
        Self {
            script: Script::new(vec![Err(error)]),
        }
    }

    /// Number of invocations.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl Optimizer for ScriptedOptimizer {
    async fn optimize(
        &self,
        candidate: &Candidate,
        _page: &PageConfig,
        _quality: &QualityRequirements,
        _cancel: &CancellationToken,
    ) -> Result<OptimizedArtifact, ServiceError> {
        self.script.next().unwrap_or_else(|| Err(exhausted()))?;
        Ok(OptimizedArtifact::new(
            candidate.markup.clone(),
            OptimizationAnalysis {
                estimated_pages: 1,
                ..OptimizationAnalysis::default()
            },
        ))
    }
}
