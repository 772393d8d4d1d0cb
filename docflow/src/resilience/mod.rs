//! Resilient access to the completion service.
//!
//! This module provides:
//! - Failure classification into [`ServiceErrorKind`](crate::errors::ServiceErrorKind)
//! - Exponential rate-limit and linear network backoff
//! - A per-credential rate-limit coordinator shared across runs
//! - Structured-output extraction with one corrective reprompt

mod backoff;
mod classify;
mod client;
mod coordinator;
mod extract;

pub use backoff::{BackoffPolicy, JitterStrategy};
pub use classify::{classify, classify_status, parse_retry_after, reports_quota};
pub use client::{ResilientClient, DEFAULT_CREDENTIAL_KEY};
pub use coordinator::RateLimitCoordinator;
pub use extract::{extract_json_object, parse_structured};
