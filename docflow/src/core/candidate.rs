//! Generated candidates and the context for regenerating them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One attempt's generated markup, not yet known to be valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Generated markup.
    pub markup: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Issues this attempt was asked to correct (empty on the first attempt).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<String>,
    /// Free-form metadata returned by the generator.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// SHA-256 of the markup, hex encoded.
    pub fingerprint: String,
    /// When the candidate was produced.
    pub generated_at: DateTime<Utc>,
}

impl Candidate {
    /// Creates a first-attempt style candidate.
    #[must_use]
    pub fn new(markup: impl Into<String>, attempt: u32) -> Self {
        let markup = markup.into();
        let fingerprint = fingerprint(&markup);
        Self {
            markup,
            attempt,
            corrections: Vec::new(),
            metadata: serde_json::Value::Null,
            fingerprint,
            generated_at: Utc::now(),
        }
    }

    /// Records the corrections that produced this candidate.
    #[must_use]
    pub fn with_corrections(mut self, corrections: Vec<String>) -> Self {
        self.corrections = corrections;
        self
    }

    /// Attaches generator metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns true if this candidate came from a regeneration.
    #[must_use]
    pub fn is_regenerated(&self) -> bool {
        !self.corrections.is_empty()
    }
}

/// Hex SHA-256 of a markup string.
#[must_use]
pub fn fingerprint(markup: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(markup.as_bytes());
    hex::encode(hasher.finalize())
}

/// The previous attempt handed back to the generator for a targeted fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorAttempt {
    /// Markup of the rejected candidate.
    pub markup: String,
    /// Validator issues, in verdict order.
    pub issues: Vec<String>,
}

/// What the generator is asked to do on one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Present on regeneration.
    pub prior: Option<PriorAttempt>,
}

impl GenerationAttempt {
    /// The first attempt.
    #[must_use]
    pub fn first() -> Self {
        Self {
            number: 1,
            prior: None,
        }
    }

    /// A regeneration after `candidate` failed with `issues`.
    #[must_use]
    pub fn regenerate(candidate: &Candidate, issues: Vec<String>) -> Self {
        Self {
            number: candidate.attempt + 1,
            prior: Some(PriorAttempt {
                markup: candidate.markup.clone(),
                issues,
            }),
        }
    }

    /// Issues the generator should correct, if any.
    #[must_use]
    pub fn prior_issues(&self) -> &[String] {
        match self.prior {
            Some(ref prior) => &prior.issues,
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Candidate::new("<p>x</p>", 1);
        let b = Candidate::new("<p>x</p>", 2);
        let c = Candidate::new("<p>y</p>", 1);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn test_regeneration_attempt() {
        let first = Candidate::new("<p>x</p>", 1);
        assert!(!first.is_regenerated());

        let attempt = GenerationAttempt::regenerate(&first, vec!["wrong color".to_string()]);
        assert_eq!(attempt.number, 2);
        assert_eq!(attempt.prior_issues(), &["wrong color".to_string()]);
        assert!(GenerationAttempt::first().prior_issues().is_empty());
    }
}
