//! The three pipeline stages and their service-backed implementations.
//!
//! Stages are plain functions over immutable inputs; they share a
//! [`ResilientClient`](crate::resilience::ResilientClient) and never retry on
//! their own.

mod generator;
pub mod layout;
pub mod mechanical;
mod optimizer;
pub mod prompts;
mod validator;

pub use generator::LlmGenerator;
pub use optimizer::LlmOptimizer;
pub use validator::LlmValidator;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::fmt::Debug;

use crate::cancellation::CancellationToken;
use crate::core::{
    BrandingConfig, Candidate, GenerationAttempt, GenerationRequest, OptimizedArtifact,
    PageConfig, QualityRequirements, Template, ValidationVerdict,
};
use crate::errors::ServiceError;

/// Fills a template with request data.
#[async_trait]
pub trait Generator: Send + Sync + Debug {
    /// Produces the candidate for `attempt`.
    ///
    /// On regeneration `attempt` carries the rejected markup and the issues
    /// to correct; the returned candidate records them as its corrections.
    async fn generate(
        &self,
        template: &Template,
        request: &GenerationRequest,
        attempt: &GenerationAttempt,
        cancel: &CancellationToken,
    ) -> Result<Candidate, ServiceError>;
}

/// Judges a candidate against its template, branding and request.
#[async_trait]
pub trait Validator: Send + Sync + Debug {
    /// Produces a verdict. Never mutates the candidate.
    async fn validate(
        &self,
        candidate: &Candidate,
        template: &Template,
        branding: &BrandingConfig,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ValidationVerdict, ServiceError>;
}

/// Prepares a validated candidate for print.
#[async_trait]
pub trait Optimizer: Send + Sync + Debug {
    /// Produces the final artifact for a validated candidate.
    async fn optimize(
        &self,
        candidate: &Candidate,
        page: &PageConfig,
        quality: &QualityRequirements,
        cancel: &CancellationToken,
    ) -> Result<OptimizedArtifact, ServiceError>;
}

/// Rejects empty or whitespace-only markup during deserialization, so the
/// resilience client treats it as malformed output.
pub(crate) fn non_empty_markup<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let markup = String::deserialize(deserializer)?;
    if markup.trim().is_empty() {
        return Err(serde::de::Error::custom("markup must not be empty"));
    }
    Ok(markup)
}
