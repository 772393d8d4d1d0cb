//! # Docflow
//!
//! Template-faithful document generation over a generative completion
//! service.
//!
//! A caller-owned HTML template is filled with request data, checked by a
//! two-tier validator and prepared for print. Docflow provides:
//!
//! - **Validation-gated generation**: a candidate reaches the optimizer only
//!   after it passes mechanical and semantic checks
//! - **Bounded regeneration**: failed candidates are regenerated with the
//!   validator's issues, at most `max_retries + 1` times
//! - **Resilient service access**: classified errors, exponential rate-limit
//!   backoff and a rate-limit coordinator shared across runs
//! - **Cooperative cancellation** at every suspension point
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::from_env()?;
//! let provider = Arc::new(HttpCompletionProvider::from_env()?);
//! let client = Arc::new(ResilientClient::new(provider, &config));
//! let orchestrator = Orchestrator::with_client(client, config)
//!     .with_event_sink(Arc::new(LoggingEventSink::default()));
//!
//! let input = PipelineInput::new(template, branding, request);
//! match orchestrator.run(&input, &CancellationToken::new()).await {
//!     PipelineOutcome::Success { artifact, .. } => println!("{}", artifact.markup),
//!     PipelineOutcome::Failure { reason, last_issues, .. } => eprintln!("{reason}: {last_issues:?}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod provider;
pub mod resilience;
pub mod stages;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{PipelineConfig, ProviderConfig};
    pub use crate::core::{
        BrandingConfig, Candidate, ClientInfo, EventInfo, GenerationRequest, LineItem,
        OptimizedArtifact, PageConfig, PipelineOutcome, Pricing, QualityRequirements, Template,
        ValidationVerdict,
    };
    pub use crate::errors::{FailureReason, ServiceError, ServiceErrorKind};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::orchestrator::{Orchestrator, PipelineInput};
    #[cfg(feature = "http")]
    pub use crate::provider::HttpCompletionProvider;
    pub use crate::provider::{CompletionProvider, CompletionRequest};
    pub use crate::resilience::{RateLimitCoordinator, ResilientClient};
    pub use crate::stages::{Generator, Optimizer, Validator};
}
