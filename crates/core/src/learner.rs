//! Long-term learner memory — concepts, misconceptions, and progress.
//!
//! Mutated only by the memory updater, and only for interactions that
//! reached the `Committed` state. The applied-interaction set makes every
//! application idempotent: the same interaction id can never double-count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::LearnerId;

/// Mastery levels run 0 (unseen) through this cap.
pub const MAX_MASTERY_LEVEL: u8 = 5;

/// One concept the learner has practiced, with its mastery level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMastery {
    /// Concept identifier (e.g., "for-loops")
    pub concept: String,

    /// 0..=MAX_MASTERY_LEVEL; advances one level per qualifying interaction
    pub mastery_level: u8,

    /// First time the concept was practiced
    pub first_seen: DateTime<Utc>,

    /// Most recent practice
    pub last_practiced: DateTime<Utc>,
}

/// A misconception the instructor is working to correct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Misconception {
    /// The misunderstood concept
    pub concept: String,

    /// Whether the misconception has been resolved
    pub resolved: bool,

    /// Correction attempts made by the instructor
    pub correction_attempts: u32,
}

/// A milestone in the learner's journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMarker {
    /// Short label (e.g., "mastered recursion")
    pub label: String,

    /// When the milestone was reached
    pub at: DateTime<Utc>,
}

/// Everything the system remembers about a learner across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerMemory {
    /// The learner this memory belongs to
    pub learner_id: LearnerId,

    /// Concepts practiced, with mastery levels
    #[serde(default)]
    pub concepts: Vec<ConceptMastery>,

    /// Known misconceptions
    #[serde(default)]
    pub misconceptions: Vec<Misconception>,

    /// Observed strengths
    #[serde(default)]
    pub strengths: Vec<String>,

    /// Observed weaknesses
    #[serde(default)]
    pub weaknesses: Vec<String>,

    /// Milestones
    #[serde(default)]
    pub progress_markers: Vec<ProgressMarker>,

    /// Interaction ids already applied — the idempotency keys
    #[serde(default)]
    pub applied_interactions: Vec<String>,
}

impl LearnerMemory {
    /// Empty memory for a new learner.
    pub fn new(learner_id: LearnerId) -> Self {
        Self {
            learner_id,
            concepts: Vec::new(),
            misconceptions: Vec::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            progress_markers: Vec::new(),
            applied_interactions: Vec::new(),
        }
    }

    /// Whether an interaction id has already been applied.
    pub fn has_applied(&self, interaction_id: &str) -> bool {
        self.applied_interactions
            .iter()
            .any(|id| id == interaction_id)
    }

    /// Current mastery level of a concept (0 if unseen).
    pub fn mastery_of(&self, concept: &str) -> u8 {
        self.concepts
            .iter()
            .find(|c| c.concept == concept)
            .map(|c| c.mastery_level)
            .unwrap_or(0)
    }

    /// Unresolved misconceptions, for prompt context.
    pub fn unresolved_misconceptions(&self) -> impl Iterator<Item = &Misconception> {
        self.misconceptions.iter().filter(|m| !m.resolved)
    }
}
