//! Pipeline states and stage names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stage a latency record or event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Fills the template.
    Generator,
    /// Judges the candidate.
    Validator,
    /// Prepares the candidate for print.
    Optimizer,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generator => write!(f, "generator"),
            Self::Validator => write!(f, "validator"),
            Self::Optimizer => write!(f, "optimizer"),
        }
    }
}

/// States of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has run yet.
    #[default]
    Init,
    /// A candidate exists for the current attempt.
    Generated,
    /// The current candidate passed validation.
    ValidatedOk,
    /// The current candidate failed validation.
    ValidatedFail,
    /// Terminal success.
    Optimized,
    /// Terminal failure.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Generated => write!(f, "generated"),
            Self::ValidatedOk => write!(f, "validated_ok"),
            Self::ValidatedFail => write!(f, "validated_fail"),
            Self::Optimized => write!(f, "optimized"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl PipelineState {
    /// Returns true for `Optimized` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Optimized | Self::Failed)
    }

    /// Returns true if `next` is a legal successor.
    ///
    /// Any non-terminal state may fail; otherwise the graph is
    /// `Init → Generated → ValidatedOk → Optimized` with the
    /// `ValidatedFail → Generated` regeneration edge.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Self::Failed)
                | (Self::Init | Self::ValidatedFail, Self::Generated)
                | (Self::Generated, Self::ValidatedOk | Self::ValidatedFail)
                | (Self::ValidatedOk, Self::Optimized)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(PipelineState::Init.can_transition_to(PipelineState::Generated));
        assert!(PipelineState::Generated.can_transition_to(PipelineState::ValidatedOk));
        assert!(PipelineState::ValidatedOk.can_transition_to(PipelineState::Optimized));
    }

    #[test]
    fn test_regeneration_loop() {
        assert!(PipelineState::Generated.can_transition_to(PipelineState::ValidatedFail));
        assert!(PipelineState::ValidatedFail.can_transition_to(PipelineState::Generated));
        assert!(PipelineState::ValidatedFail.can_transition_to(PipelineState::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!PipelineState::Init.can_transition_to(PipelineState::Optimized));
        assert!(!PipelineState::ValidatedFail.can_transition_to(PipelineState::Optimized));
        assert!(!PipelineState::Optimized.can_transition_to(PipelineState::Failed));
        assert!(!PipelineState::Failed.can_transition_to(PipelineState::Generated));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::ValidatedFail.to_string(), "validated_fail");
        assert_eq!(StageName::Optimizer.to_string(), "optimizer");
    }
}
