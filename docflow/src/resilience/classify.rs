//! Maps raw transport failures onto [`ServiceErrorKind`].
//!
//! This is the only place that looks at status codes or error bodies.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::errors::{ProviderFailure, ServiceError, ServiceErrorKind};

const QUOTA_MARKERS: &[&str] = &[
    "insufficient_quota",
    "quota_exceeded",
    "billing",
    "credit balance",
    "out of credits",
    "credits exhausted",
];

/// Classifies a transport failure into a typed service error.
///
/// The returned message is built from the status or transport description
/// only; upstream bodies never leak into it.
#[must_use]
pub fn classify(failure: &ProviderFailure) -> ServiceError {
    match failure {
        ProviderFailure::Http {
            status,
            body,
            retry_after,
        } => {
            let status = *status;
            let kind = classify_status(status, body);
            ServiceError::new(kind, format!("service answered HTTP {status}"))
                .with_status(status)
                .with_retry_after(*retry_after)
        }
        ProviderFailure::Transport {
            message,
            timed_out: true,
        } => ServiceError::timeout(format!("transport timed out: {message}")),
        ProviderFailure::Transport { message, .. } => {
            ServiceError::unreachable(format!("transport failed: {message}"))
        }
        ProviderFailure::InvalidEnvelope(message) => {
            ServiceError::malformed(format!("response envelope: {message}"))
        }
    }
}

/// Classifies an HTTP status, consulting the body only for quota markers.
#[must_use]
pub fn classify_status(status: u16, body: &str) -> ServiceErrorKind {
    match status {
        402 => ServiceErrorKind::QuotaExhausted,
        403 | 429 if reports_quota(body) => ServiceErrorKind::QuotaExhausted,
        429 | 529 => ServiceErrorKind::RateLimited,
        408 | 504 => ServiceErrorKind::Timeout,
        500..=599 => ServiceErrorKind::Unreachable,
        _ => ServiceErrorKind::Rejected,
    }
}

/// Returns true if an error body reports billing or credit exhaustion.
#[must_use]
pub fn reports_quota(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    QUOTA_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Parses a `Retry-After` header: delta seconds or an HTTP date.
///
/// Values that do not fit a `Duration` are ignored. The result is not
/// capped here; the client bounds the hint it honors.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    if let Ok(seconds) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).ok();
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
