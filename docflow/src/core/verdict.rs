//! Validation verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which validation tier raised an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueTier {
    /// Local, deterministic checks.
    Mechanical,
    /// Judgement from the completion service.
    Semantic,
}

/// Stable identifiers for issue categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// Unbalanced or unterminated markup.
    MalformedMarkup,
    /// Placeholder syntax left in the output.
    UnresolvedPlaceholder,
    /// A requested placeholder value is absent.
    MissingValue,
    /// A color outside branding and template.
    UnauthorizedColor,
    /// A request line item is absent.
    MissingLineItem,
    /// Narrative issue reported by the semantic check.
    SemanticDrift,
    /// Similarity below the configured threshold.
    LowSimilarity,
}

/// One concrete problem with a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Tier that found it.
    pub tier: IssueTier,
    /// Category.
    pub code: IssueCode,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a mechanical issue.
    #[must_use]
    pub fn mechanical(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            tier: IssueTier::Mechanical,
            code,
            message: message.into(),
        }
    }

    /// Creates a semantic issue.
    #[must_use]
    pub fn semantic(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            tier: IssueTier::Semantic,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The validator's structured judgement on one candidate. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Whether the candidate passed both tiers.
    pub is_valid: bool,
    /// Mechanical issues first, then semantic ones.
    pub issues: Vec<ValidationIssue>,
    /// Semantic similarity in [0, 1].
    pub similarity_score: f64,
    /// Optional overall quality score in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Always `!is_valid`.
    pub corrections_needed: bool,
}

impl ValidationVerdict {
    /// Combines both tiers.
    ///
    /// Valid iff there are no mechanical issues and the similarity score
    /// reaches `threshold`.
    #[must_use]
    pub fn combine(
        mechanical: Vec<ValidationIssue>,
        semantic: Vec<ValidationIssue>,
        similarity_score: f64,
        quality_score: Option<f64>,
        threshold: f64,
    ) -> Self {
        let similarity_score = clamp_unit(similarity_score);
        let is_valid = mechanical.is_empty() && similarity_score >= threshold;

        let mut issues = mechanical;
        let semantic_was_empty = semantic.is_empty();
        issues.extend(semantic);
        if similarity_score < threshold && semantic_was_empty {
            issues.push(ValidationIssue::semantic(
                IssueCode::LowSimilarity,
                format!(
                    "similarity to the template is {similarity_score:.2}, below the required {threshold:.2}"
                ),
            ));
        }

        Self {
            is_valid,
            issues,
            similarity_score,
            quality_score: quality_score.map(clamp_unit),
            corrections_needed: !is_valid,
        }
    }

    /// A passing verdict with no issues.
    #[must_use]
    pub fn pass(similarity_score: f64) -> Self {
        Self::combine(Vec::new(), Vec::new(), similarity_score, None, 0.0)
    }

    /// A failing verdict with the given mechanical issues.
    #[must_use]
    pub fn fail(issues: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: false,
            issues,
            similarity_score: 0.0,
            quality_score: None,
            corrections_needed: true,
        }
    }

    /// Issue messages in order.
    #[must_use]
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    /// Number of mechanical issues.
    #[must_use]
    pub fn mechanical_issue_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.tier == IssueTier::Mechanical)
            .count()
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_combine_valid() {
        let verdict = ValidationVerdict::combine(Vec::new(), Vec::new(), 0.92, Some(0.8), 0.85);
        assert!(verdict.is_valid);
        assert!(!verdict.corrections_needed);
        assert!(verdict.issues.is_empty());
    }

    #[test]
    fn test_combine_orders_mechanical_first() {
        let verdict = ValidationVerdict::combine(
            vec![ValidationIssue::mechanical(IssueCode::UnauthorizedColor, "color #ff0000")],
            vec![ValidationIssue::semantic(IssueCode::SemanticDrift, "total is wrong")],
            0.95,
            None,
            0.85,
        );
        assert!(!verdict.is_valid);
        assert!(verdict.corrections_needed);
        assert_eq!(verdict.issue_messages(), vec!["color #ff0000", "total is wrong"]);
        assert_eq!(verdict.mechanical_issue_count(), 1);
    }

    #[test]
    fn test_low_similarity_adds_issue_when_none_reported() {
        let verdict = ValidationVerdict::combine(Vec::new(), Vec::new(), 0.5, None, 0.85);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.issues[0].code, IssueCode::LowSimilarity);
    }

    #[test]
    fn test_scores_are_clamped() {
        let verdict = ValidationVerdict::combine(Vec::new(), Vec::new(), 1.7, Some(-0.2), 0.85);
        assert!((verdict.similarity_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(verdict.quality_score, Some(0.0));
    }
}
