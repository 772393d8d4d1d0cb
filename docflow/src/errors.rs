//! Error types for the docflow pipeline.
//!
//! Upstream failures are classified exactly once, at the resilience
//! boundary, into a [`ServiceErrorKind`]. Everything downstream matches on
//! the kind and never inspects message text again.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed call to the generative completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Billing or credits exhausted upstream. Never retried.
    QuotaExhausted,
    /// Transient throttling.
    RateLimited,
    /// Rate limiting persisted past the configured retry bound.
    BackoffExhausted,
    /// Response text did not parse against the expected schema.
    MalformedOutput,
    /// Malformed output recurred after the corrective reprompt.
    SchemaViolation,
    /// Network-level failure reaching the service.
    Unreachable,
    /// The call exceeded its deadline.
    Timeout,
    /// The service refused the request outright (auth, bad request).
    Rejected,
    /// The caller cancelled the run.
    Cancelled,
}

impl ServiceErrorKind {
    /// Returns true if the resilience client may retry this kind.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::MalformedOutput | Self::Unreachable | Self::Timeout
        )
    }

    /// Returns true if this kind ends a pipeline run from any state,
    /// including the optimizer stage which otherwise falls back.
    #[must_use]
    pub fn is_pipeline_fatal(&self) -> bool {
        matches!(
            self,
            Self::QuotaExhausted | Self::SchemaViolation | Self::Cancelled
        )
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QuotaExhausted => "quota_exhausted",
            Self::RateLimited => "rate_limited",
            Self::BackoffExhausted => "backoff_exhausted",
            Self::MalformedOutput => "malformed_output",
            Self::SchemaViolation => "schema_violation",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A typed, final error returned by the resilience client.
///
/// The message is always sanitized: it never contains credentials or a raw
/// upstream response body.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    /// The classified kind.
    pub kind: ServiceErrorKind,
    /// Sanitized description.
    pub message: String,
    /// HTTP status when the failure came from an HTTP response.
    pub status: Option<u16>,
    /// Server-provided retry hint, if any.
    pub retry_after: Option<Duration>,
    /// Number of calls made before this error became final.
    pub attempts: u32,
}

impl ServiceError {
    /// Creates a new service error of the given kind.
    #[must_use]
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
            attempts: 0,
        }
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the retry hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Records how many calls were made.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Creates a quota-exhausted error.
    #[must_use]
    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::QuotaExhausted, message)
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::RateLimited, message)
    }

    /// Creates a malformed-output error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::MalformedOutput, message)
    }

    /// Creates an unreachable error.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Unreachable, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Timeout, message)
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Cancelled, reason)
    }

    /// Returns true if the error ends a pipeline from any state.
    #[must_use]
    pub fn is_pipeline_fatal(&self) -> bool {
        self.kind.is_pipeline_fatal()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("attempts".to_string(), serde_json::json!(self.attempts));
        if let Some(status) = self.status {
            map.insert("status".to_string(), serde_json::json!(status));
        }
        if let Some(retry_after) = self.retry_after {
            map.insert(
                "retry_after_ms".to_string(),
                serde_json::json!(u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX)),
            );
        }
        map
    }
}

/// The terminal reason reported with a failed pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Upstream credits are exhausted.
    QuotaExhausted,
    /// Rate limiting outlasted the backoff bound.
    BackoffExhausted,
    /// The service kept returning output that does not match the schema.
    SchemaViolation,
    /// Every generation attempt failed validation.
    MaxRetriesExceeded,
    /// The caller cancelled the run.
    Cancelled,
    /// The service could not be reached after bounded retries.
    Unreachable,
    /// The service kept timing out after bounded retries.
    Timeout,
    /// The service refused the request.
    Rejected,
}

impl From<ServiceErrorKind> for FailureReason {
    fn from(kind: ServiceErrorKind) -> Self {
        match kind {
            ServiceErrorKind::QuotaExhausted => Self::QuotaExhausted,
            ServiceErrorKind::RateLimited | ServiceErrorKind::BackoffExhausted => {
                Self::BackoffExhausted
            }
            ServiceErrorKind::MalformedOutput | ServiceErrorKind::SchemaViolation => {
                Self::SchemaViolation
            }
            ServiceErrorKind::Unreachable => Self::Unreachable,
            ServiceErrorKind::Timeout => Self::Timeout,
            ServiceErrorKind::Rejected => Self::Rejected,
            ServiceErrorKind::Cancelled => Self::Cancelled,
        }
    }
}

impl From<&ServiceError> for FailureReason {
    fn from(err: &ServiceError) -> Self {
        err.kind.into()
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::QuotaExhausted => "generation credits exhausted upstream",
            Self::BackoffExhausted => "service kept rate limiting after retries",
            Self::SchemaViolation => "service output did not match the expected schema",
            Self::MaxRetriesExceeded => "document failed validation on every attempt",
            Self::Cancelled => "run cancelled",
            Self::Unreachable => "service unreachable",
            Self::Timeout => "service timed out",
            Self::Rejected => "service rejected the request",
        };
        f.write_str(text)
    }
}

/// Raw failure reported by a completion transport before classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The service answered with a non-2xx status.
    #[error("HTTP {status}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body, kept only for classification.
        body: String,
        /// Parsed `Retry-After` hint.
        retry_after: Option<Duration>,
    },
    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
        /// Whether the transport reported a timeout.
        timed_out: bool,
    },
    /// A 2xx response whose envelope did not carry any completion text.
    #[error("invalid response envelope: {0}")]
    InvalidEnvelope(String),
}

impl ProviderFailure {
    /// Creates an HTTP failure without a retry hint.
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Creates a connection-level failure.
    #[must_use]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a transport timeout.
    #[must_use]
    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timed_out: true,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds an out-of-range value.
    #[error("invalid config field '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },

    /// An environment variable could not be parsed.
    #[error("environment variable {name} is not valid: {reason}")]
    Env {
        /// Variable name.
        name: String,
        /// Parse failure.
        reason: String,
    },

    /// The config file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for the config type.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an invalid-field error.
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
