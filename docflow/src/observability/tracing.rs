//! Tracing subscriber setup and span helpers for pipeline runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::StageName;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "docflow=info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global `tracing` subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed, which
/// happens routinely in tests.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .is_ok(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true),
            )
            .try_init()
            .is_ok(),
    }
}

/// Span attributes for one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage: StageName,
    /// Generation attempt the invocation belongs to.
    pub attempt: u32,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Classified error kind if the stage failed.
    pub error_kind: Option<String>,
}

impl StageSpanAttributes {
    /// Creates attributes for `stage` on `attempt`.
    #[must_use]
    pub fn new(stage: StageName, attempt: u32) -> Self {
        Self {
            stage,
            attempt,
            duration_ms: None,
            error_kind: None,
        }
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error kind.
    #[must_use]
    pub fn with_error_kind(mut self, kind: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self
    }

    /// Flattens the attributes into dotted keys for event payloads.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("stage.name".to_string(), self.stage.to_string());
        attrs.insert("stage.attempt".to_string(), self.attempt.to_string());
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), format!("{v:.3}"));
        }
        if let Some(ref v) = self.error_kind {
            attrs.insert("stage.error_kind".to_string(), v.clone());
        }
        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span, logs it at debug level and returns milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(span_name = %self.name, duration_ms, "Span finished");
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_span_attributes() {
        let attrs = StageSpanAttributes::new(StageName::Validator, 2)
            .with_duration_ms(12.5)
            .with_error_kind("timeout");

        let flat = attrs.to_attributes();
        assert_eq!(flat.get("stage.name"), Some(&"validator".to_string()));
        assert_eq!(flat.get("stage.attempt"), Some(&"2".to_string()));
        assert_eq!(flat.get("stage.duration_ms"), Some(&"12.500".to_string()));
        assert_eq!(flat.get("stage.error_kind"), Some(&"timeout".to_string()));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("generator");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(timer.name(), "generator");
        let duration = timer.finish();
        assert!(duration >= 10.0);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let _ = init_tracing(LogFormat::Pretty);
        assert!(!init_tracing(LogFormat::Json));
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
