//! Validation outcome types shared between the validator and orchestrator.

use serde::{Deserialize, Serialize};

/// How severe a violated check is. Severity belongs to the tier a check is
/// registered in, not to the individual check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

/// What the orchestrator must do with a generated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationAction {
    /// Commit the response.
    Accept,
    /// Discard the draft and generate again with a stricter request.
    Regenerate,
    /// Discard the draft and serve the canned safe fallback.
    Reject,
}

/// One violated check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable id of the check that fired
    pub check_id: String,

    /// Tier severity of the check
    pub severity: Severity,

    /// Human-readable detail from the predicate
    pub detail: String,
}

/// The outcome of running the tiered validation pipeline over one draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// The action the orchestrator must take
    pub action: ValidationAction,

    /// All violations collected, ordered by tier then registration order
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    /// A clean result with no violations.
    pub fn accept() -> Self {
        Self {
            action: ValidationAction::Accept,
            violations: Vec::new(),
        }
    }

    pub fn is_accept(&self) -> bool {
        self.action == ValidationAction::Accept
    }

    /// The most severe violation present, if any.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}
