//! Session domain types.
//!
//! A session pairs one learner with one instructor profile snapshot and owns
//! the set of lesson screens the learner works through. Sessions are created
//! by an external "start session" collaborator; this crate models the value
//! itself and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::ProfileSnapshot;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a learner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LearnerId(pub String);

impl LearnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for LearnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LearnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The learner is working through the lesson.
    Active,
    /// Temporarily suspended; can resume.
    Paused,
    /// All screens completed.
    Completed,
    /// Abandoned by timeout policy (external).
    Abandoned,
}

impl SessionState {
    /// Terminal states cannot transition further.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

/// One learner's run through a lesson with one instructor.
///
/// The instructor profile is snapshotted into the session at creation and
/// never re-read from the mutable profile store while the session is live,
/// so a mid-session profile edit cannot shift the instructor's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: SessionId,

    /// The learner this session belongs to
    pub learner_id: LearnerId,

    /// Immutable instructor snapshot taken at session start
    pub profile: ProfileSnapshot,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session last changed
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new active session with the given profile snapshot.
    pub fn new(learner_id: LearnerId, profile: ProfileSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            learner_id,
            profile,
            state: SessionState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether operations may run against this session.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}
