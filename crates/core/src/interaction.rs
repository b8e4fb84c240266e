//! Interaction — one learner submission and its generation/validation
//! lifecycle.
//!
//! An interaction is never reused; it is the unit of idempotency and
//! cancellation. State transitions go through [`Interaction::transition`]
//! so illegal moves are rejected in one place, and the terminal states
//! (`Committed`, `Cancelled`, `Failed`) are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::screen::ScreenId;
use crate::session::SessionId;
use crate::validation::Violation;

/// Unique identifier for an interaction. Caller- or server-assigned;
/// unique per submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub String);

impl InteractionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InteractionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one submission through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    /// Admitted, not yet generating.
    Pending,
    /// Generation in flight.
    Generating,
    /// Full text buffered, validator tiers running.
    Validating,
    /// A validation tier requested another generation pass.
    Regenerating,
    /// Accepted and durably committed with its memory update.
    Committed,
    /// Superseded by a later submission; result discarded.
    Cancelled,
    /// Rejected after retries or failed generation; fallback served.
    Failed,
}

impl InteractionState {
    /// Terminal states admit no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Cancelled | Self::Failed)
    }

    /// Legal next states from this one.
    fn can_transition_to(&self, next: InteractionState) -> bool {
        use InteractionState::*;
        match self {
            Pending => matches!(next, Generating | Cancelled | Failed),
            Generating => matches!(next, Validating | Cancelled | Failed),
            Validating => matches!(next, Regenerating | Committed | Cancelled | Failed),
            Regenerating => matches!(next, Validating | Cancelled | Failed),
            Committed | Cancelled | Failed => false,
        }
    }
}

impl std::fmt::Display for InteractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Regenerating => "regenerating",
            Self::Committed => "committed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One learner submission and its instructor response lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Unique ID for this submission
    pub id: InteractionId,

    /// Owning session
    pub session_id: SessionId,

    /// Screen the submission targets
    pub screen_id: ScreenId,

    /// Generation epoch assigned at admission; stale epochs never commit
    pub epoch: u64,

    /// The learner's submitted text
    pub input: String,

    /// Current lifecycle state
    pub state: InteractionState,

    /// The accepted instructor response; only set when committed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,

    /// Violations collected across validation rounds (audit trail)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,

    /// When the submission was admitted
    pub created_at: DateTime<Utc>,

    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl Interaction {
    /// Create a freshly admitted interaction in the `Pending` state.
    pub fn new(
        id: InteractionId,
        session_id: SessionId,
        screen_id: ScreenId,
        epoch: u64,
        input: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id,
            screen_id,
            epoch,
            input: input.into(),
            state: InteractionState::Pending,
            result_text: None,
            violations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(
        &mut self,
        next: InteractionState,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Whether this interaction has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
