//! Instructor profile — teaching persona and the per-session snapshot.
//!
//! The profile store is mutable (an admin can retune an instructor at any
//! time), so active sessions never read it directly. At session start the
//! profile is frozen into a [`ProfileSnapshot`] carried by the session; all
//! prompt assembly reads the snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an instructor profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the instructor leads the learner toward understanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachingStyle {
    /// Questions first; never hands over the answer.
    #[default]
    Socratic,
    /// Explains directly, then checks understanding.
    Direct,
    /// Prioritizes confidence-building feedback.
    Encouraging,
    /// Precise, formal, proof-oriented.
    Rigorous,
}

/// How much the instructor says per turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Terse,
    #[default]
    Balanced,
    Expansive,
}

/// The mutable, store-side instructor profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructorProfile {
    /// Unique profile ID
    pub id: ProfileId,

    /// Display name shown to the learner
    pub display_name: String,

    /// Teaching approach
    pub style: TeachingStyle,

    /// Free-form tone description (e.g., "warm, patient")
    pub tone: String,

    /// Response length preference
    pub verbosity: Verbosity,

    /// Additional behavioral rules, one per line in the identity segment
    #[serde(default)]
    pub rules: Vec<String>,

    /// When the profile was last edited
    pub updated_at: DateTime<Utc>,
}

impl InstructorProfile {
    /// A sensible default instructor for tests and demos.
    pub fn default_profile() -> Self {
        Self {
            id: ProfileId::new(),
            display_name: "Mentora".into(),
            style: TeachingStyle::Socratic,
            tone: "warm, patient".into(),
            verbosity: Verbosity::Balanced,
            rules: vec![
                "Guide with questions before explanations".into(),
                "Acknowledge effort before correcting mistakes".into(),
            ],
            updated_at: Utc::now(),
        }
    }

    /// Freeze this profile into an immutable per-session snapshot.
    pub fn snapshot(&self, now: DateTime<Utc>) -> ProfileSnapshot {
        ProfileSnapshot {
            profile_id: self.id.clone(),
            display_name: self.display_name.clone(),
            style: self.style,
            tone: self.tone.clone(),
            verbosity: self.verbosity,
            rules: self.rules.clone(),
            taken_at: now,
        }
    }
}

/// Immutable per-session copy of the instructor profile.
///
/// Once embedded in a session this value is never updated, even if the
/// source profile changes mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// The profile this snapshot was taken from
    pub profile_id: ProfileId,

    /// Display name at snapshot time
    pub display_name: String,

    /// Teaching approach at snapshot time
    pub style: TeachingStyle,

    /// Tone at snapshot time
    pub tone: String,

    /// Verbosity at snapshot time
    pub verbosity: Verbosity,

    /// Behavioral rules at snapshot time
    #[serde(default)]
    pub rules: Vec<String>,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}
