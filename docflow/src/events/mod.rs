//! Lifecycle events emitted by the orchestrator.
//!
//! The orchestrator is handed an `Arc<dyn EventSink>` at construction; there
//! is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run began.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A stage returned successfully.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage returned a service error.
pub const STAGE_FAILED: &str = "stage.failed";
/// The verdict was invalid and another generation attempt follows.
pub const PIPELINE_REGENERATING: &str = "pipeline.regenerating";
/// The run ended in `Success`.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// The run ended in `Failure`.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
