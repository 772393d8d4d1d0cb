//! Core domain model types for docflow.
//!
//! This module contains the records exchanged between pipeline stages:
//! - Templates, branding and the generation request (inputs)
//! - Candidates and validation verdicts (intermediate)
//! - Optimized artifacts and the pipeline outcome (results)

mod artifact;
mod branding;
mod candidate;
pub mod color;
mod outcome;
mod request;
mod status;
mod template;
mod verdict;

pub use artifact::{
    OptimizationAnalysis, OptimizedArtifact, Orientation, PageConfig, PageSize,
    QualityRequirements,
};
pub use branding::BrandingConfig;
pub use candidate::{fingerprint, Candidate, GenerationAttempt, PriorAttempt};
pub use color::Color;
pub use outcome::{PipelineMetadata, PipelineOutcome, StageLatency};
pub use request::{
    format_money, ClientInfo, DisplayFlags, EventInfo, GenerationRequest, LineItem, Pricing,
};
pub use status::{PipelineState, StageName};
pub use template::{find_placeholders, unresolved_placeholders, Template};
pub use verdict::{IssueCode, IssueTier, ValidationIssue, ValidationVerdict};
