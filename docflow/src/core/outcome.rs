//! The value an orchestration run returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::{OptimizationAnalysis, OptimizedArtifact};
use super::status::{PipelineState, StageName};
use crate::errors::FailureReason;

/// Wall-clock time spent in one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageLatency {
    /// The stage.
    pub stage: StageName,
    /// Generation attempt the invocation belongs to.
    pub attempt: u32,
    /// Duration in milliseconds.
    pub duration_ms: f64,
}

/// Bookkeeping for one run, returned on success and failure alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Generation attempts made.
    pub attempts: u32,
    /// Generator invocations, counting a failed one.
    #[serde(default)]
    pub generator_calls: u32,
    /// Validator invocations.
    pub validator_calls: u32,
    /// Optimizer invocations.
    pub optimizer_calls: u32,
    /// Per-stage latency in invocation order.
    pub stage_latencies: Vec<StageLatency>,
    /// Every state the run visited, starting with `Init`.
    pub state_history: Vec<PipelineState>,
    /// Attempts whose markup was identical to the previous attempt.
    #[serde(default)]
    pub stagnant_attempts: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// The optimizer's analysis, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<OptimizationAnalysis>,
}

impl PipelineMetadata {
    /// Starts metadata for a new run.
    #[must_use]
    pub fn start(run_id: Uuid) -> Self {
        Self {
            run_id,
            attempts: 0,
            generator_calls: 0,
            validator_calls: 0,
            optimizer_calls: 0,
            stage_latencies: Vec::new(),
            state_history: vec![PipelineState::Init],
            stagnant_attempts: 0,
            started_at: Utc::now(),
            finished_at: None,
            analysis: None,
        }
    }

    /// The last state visited.
    #[must_use]
    pub fn final_state(&self) -> PipelineState {
        self.state_history.last().copied().unwrap_or_default()
    }

    /// Total milliseconds spent in `stage` across the run.
    #[must_use]
    pub fn total_latency_ms(&self, stage: StageName) -> f64 {
        self.stage_latencies
            .iter()
            .filter(|l| l.stage == stage)
            .map(|l| l.duration_ms)
            .sum()
    }
}

/// The only value the orchestrator returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The document was generated, validated and optimized.
    Success {
        /// Final artifact.
        artifact: OptimizedArtifact,
        /// Run bookkeeping.
        metadata: PipelineMetadata,
    },
    /// The run ended without a valid document.
    Failure {
        /// Why the run failed.
        reason: FailureReason,
        /// Sanitized detail for logs and support.
        detail: String,
        /// Issues from the most recent verdict, if any.
        last_issues: Vec<String>,
        /// Run bookkeeping.
        metadata: PipelineMetadata,
    },
}

impl PipelineOutcome {
    /// Returns true on success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Run bookkeeping.
    #[must_use]
    pub fn metadata(&self) -> &PipelineMetadata {
        match self {
            Self::Success { metadata, .. } | Self::Failure { metadata, .. } => metadata,
        }
    }

    /// The artifact on success.
    #[must_use]
    pub fn artifact(&self) -> Option<&OptimizedArtifact> {
        match self {
            Self::Success { artifact, .. } => Some(artifact),
            Self::Failure { .. } => None,
        }
    }

    /// The failure reason on failure.
    #[must_use]
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason, .. } => Some(*reason),
        }
    }

    /// Issues reported with a failure; empty on success.
    #[must_use]
    pub fn last_issues(&self) -> &[String] {
        match self {
            Self::Success { .. } => &[],
            Self::Failure { last_issues, .. } => last_issues,
        }
    }
}
