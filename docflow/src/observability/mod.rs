//! Logging setup and stage timing.

mod tracing;

pub use tracing::{init_tracing, LogFormat, SpanTimer, StageSpanAttributes, DEFAULT_FILTER};
