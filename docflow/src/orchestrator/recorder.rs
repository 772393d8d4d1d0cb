//! Per-run bookkeeping: state history, latencies and lifecycle events.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::{
    OptimizedArtifact, PipelineMetadata, PipelineOutcome, PipelineState, StageLatency, StageName,
};
use crate::errors::{FailureReason, ServiceError};
use crate::events::{EventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, STAGE_COMPLETED, STAGE_FAILED};
use crate::observability::StageSpanAttributes;

/// Accumulates the metadata of one run and reports its events.
pub(crate) struct RunRecorder {
    metadata: PipelineMetadata,
    sink: Arc<dyn EventSink>,
}

impl RunRecorder {
    pub(crate) fn start(run_id: Uuid, sink: Arc<dyn EventSink>) -> Self {
        Self {
            metadata: PipelineMetadata::start(run_id),
            sink,
        }
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut PipelineMetadata {
        &mut self.metadata
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.metadata.final_state()
    }

    /// Moves to `next`. Illegal moves are logged and ignored.
    pub(crate) fn transition(&mut self, next: PipelineState) -> bool {
        let current = self.state();
        if !current.can_transition_to(next) {
            error!(from = ?current, to = ?next, "Rejected illegal state transition");
            return false;
        }
        debug!(from = ?current, to = ?next, "State transition");
        self.metadata.state_history.push(next);
        true
    }

    pub(crate) async fn emit(&self, event_type: &str, data: Value) {
        let mut data = data;
        if let Some(obj) = data.as_object_mut() {
            obj.insert("run_id".to_string(), json!(self.metadata.run_id));
        }
        self.sink.emit(event_type, Some(data)).await;
    }

    pub(crate) async fn stage_completed(&mut self, stage: StageName, attempt: u32, duration_ms: f64) {
        self.push_latency(stage, attempt, duration_ms);
        let attrs = StageSpanAttributes::new(stage, attempt).with_duration_ms(duration_ms);
        debug!(attributes = ?attrs.to_attributes(), "Stage completed");
        self.emit(STAGE_COMPLETED, stage_payload(&attrs)).await;
    }

    pub(crate) async fn stage_failed(
        &mut self,
        stage: StageName,
        attempt: u32,
        duration_ms: f64,
        err: &ServiceError,
    ) {
        self.push_latency(stage, attempt, duration_ms);
        let attrs = StageSpanAttributes::new(stage, attempt)
            .with_duration_ms(duration_ms)
            .with_error_kind(err.kind.to_string());
        warn!(%stage, attempt, kind = %err.kind, error = %err.message, "Stage failed");
        let mut payload = stage_payload(&attrs);
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("error".to_string(), json!(err.to_dict()));
        }
        self.emit(STAGE_FAILED, payload).await;
    }

    fn push_latency(&mut self, stage: StageName, attempt: u32, duration_ms: f64) {
        self.metadata.stage_latencies.push(StageLatency {
            stage,
            attempt,
            duration_ms,
        });
    }

    pub(crate) async fn succeed(mut self, artifact: OptimizedArtifact) -> PipelineOutcome {
        self.transition(PipelineState::Optimized);
        self.metadata.finished_at = Some(Utc::now());
        self.metadata.analysis = Some(artifact.analysis.clone());
        info!(
            attempts = self.metadata.attempts,
            pages = artifact.analysis.estimated_pages,
            fallback = artifact.analysis.fallback,
            "Pipeline completed"
        );
        self.emit(
            PIPELINE_COMPLETED,
            json!({
                "attempts": self.metadata.attempts,
                "estimated_pages": artifact.analysis.estimated_pages,
                "fallback": artifact.analysis.fallback,
            }),
        )
        .await;
        PipelineOutcome::Success {
            artifact,
            metadata: self.metadata,
        }
    }

    pub(crate) async fn fail(
        mut self,
        reason: FailureReason,
        detail: String,
        last_issues: Vec<String>,
    ) -> PipelineOutcome {
        self.transition(PipelineState::Failed);
        self.metadata.finished_at = Some(Utc::now());
        warn!(%reason, %detail, attempts = self.metadata.attempts, "Pipeline failed");
        self.emit(
            PIPELINE_FAILED,
            json!({
                "reason": reason,
                "detail": &detail,
                "attempts": self.metadata.attempts,
                "issues": last_issues.len(),
            }),
        )
        .await;
        PipelineOutcome::Failure {
            reason,
            detail,
            last_issues,
            metadata: self.metadata,
        }
    }
}

fn stage_payload(attrs: &StageSpanAttributes) -> Value {
    serde_json::to_value(attrs).unwrap_or_else(|_| json!({ "stage": attrs.stage }))
}
