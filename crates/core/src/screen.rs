//! Lesson screen state — phase machine, constraints, and progress.
//!
//! A screen is one discrete lesson phase with its own unlock, constraint,
//! and progress tracking. The phase enum is the single source of truth;
//! caller-facing booleans (`can_submit`, `can_complete`, ...) are derived on
//! demand via [`ScreenState::flags`] instead of being stored redundantly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionId;

/// Sliding window used for the per-screen rate limit.
pub const RATE_WINDOW_SECS: i64 = 60;

/// Unique identifier for a screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScreenId(pub String);

impl ScreenId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ScreenId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScreenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of lesson phase a screen represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenType {
    /// Introduces a concept.
    #[default]
    Concept,
    /// Guided exercise against the concept.
    Practice,
    /// Graded check of mastery.
    Assessment,
    /// Revisits earlier material.
    Review,
}

/// The phase machine for a screen.
///
/// `Locked` → `Unlocked` (prerequisites completed) → `Active` (started) →
/// `Completed` | `Blocked`. `Blocked` is reversible; `Completed` is terminal.
/// At most one screen per session may be `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenPhase {
    Locked,
    Unlocked,
    Active,
    Completed,
    Blocked,
}

impl ScreenPhase {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Externally-configured limits a screen enforces on the learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConstraints {
    /// Minimum seconds on screen before completion is allowed
    #[serde(default)]
    pub min_time_seconds: u64,

    /// Attempts required before completion is allowed
    #[serde(default)]
    pub required_attempts: u32,

    /// Best score needed for mastery (0.0 disables the gate)
    #[serde(default)]
    pub mastery_threshold: f32,

    /// Hard cap on attempts; `None` means unlimited
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Seconds that must pass between consumed attempts
    #[serde(default)]
    pub cooldown_seconds: u64,

    /// Submissions allowed per sliding minute
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Hints available on this screen
    #[serde(default = "default_max_hints")]
    pub max_hints: u32,
}

fn default_rate_limit() -> u32 {
    6
}

fn default_max_hints() -> u32 {
    3
}

impl Default for ScreenConstraints {
    fn default() -> Self {
        Self {
            min_time_seconds: 0,
            required_attempts: 1,
            mastery_threshold: 0.0,
            max_attempts: None,
            cooldown_seconds: 0,
            rate_limit_per_minute: default_rate_limit(),
            max_hints: default_max_hints(),
        }
    }
}

/// Mutable progress counters for a screen.
///
/// `attempts` counts only interactions that reached a terminal committed or
/// failed state; superseded (cancelled) submissions never consume one.
/// `recent_submissions` feeds the sliding rate window and is recorded at
/// admission time, cancelled or not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenProgress {
    /// Consumed attempts (committed or rejected interactions)
    pub attempts: u32,

    /// Best score achieved so far
    pub best_score: f32,

    /// Accumulated active time, updated on completion
    pub time_spent_seconds: u64,

    /// When the last attempt was consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Submission timestamps inside the rate window
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_submissions: Vec<DateTime<Utc>>,

    /// Hints served on this screen
    #[serde(default)]
    pub hints_used: u32,

    /// When the screen was first activated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ScreenProgress {
    /// Record a submission for rate-limit accounting and prune the window.
    pub fn note_submission(&mut self, now: DateTime<Utc>) {
        self.recent_submissions.push(now);
        self.prune_window(now);
    }

    /// Drop submissions that have aged out of the rate window.
    pub fn prune_window(&mut self, now: DateTime<Utc>) {
        self.recent_submissions
            .retain(|t| now.signed_duration_since(*t).num_seconds() < RATE_WINDOW_SECS);
    }

    /// Submissions currently inside the rate window.
    pub fn submissions_in_window(&self, now: DateTime<Utc>) -> usize {
        self.recent_submissions
            .iter()
            .filter(|t| now.signed_duration_since(**t).num_seconds() < RATE_WINDOW_SECS)
            .count()
    }

    /// Consume one attempt (interaction reached committed or failed).
    pub fn consume_attempt(&mut self, score: Option<f32>, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_attempt_at = Some(now);
        if let Some(score) = score {
            if score > self.best_score {
                self.best_score = score;
            }
        }
    }
}

/// One discrete lesson phase with its own unlock/constraint/progress state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenState {
    /// Unique screen ID
    pub id: ScreenId,

    /// The session this screen belongs to
    pub session_id: SessionId,

    /// What kind of lesson phase this is
    pub screen_type: ScreenType,

    /// Current phase
    pub phase: ScreenPhase,

    /// Screens that must be completed before this one unlocks
    #[serde(default)]
    pub prerequisite_screen_ids: Vec<ScreenId>,

    /// Configured limits
    #[serde(default)]
    pub constraints: ScreenConstraints,

    /// Progress counters
    #[serde(default)]
    pub progress: ScreenProgress,

    /// Topic taught on this screen (prompt context)
    pub topic: String,

    /// Concepts exercised on this screen (prompt context and insights)
    #[serde(default)]
    pub concepts: Vec<String>,
}

impl ScreenState {
    /// Create a screen in the `Locked` phase.
    pub fn new(session_id: SessionId, screen_type: ScreenType, topic: impl Into<String>) -> Self {
        Self {
            id: ScreenId::new(),
            session_id,
            screen_type,
            phase: ScreenPhase::Locked,
            prerequisite_screen_ids: Vec::new(),
            constraints: ScreenConstraints::default(),
            progress: ScreenProgress::default(),
            topic: topic.into(),
            concepts: Vec::new(),
        }
    }

    /// Whether the best score meets the mastery threshold.
    pub fn mastery_reached(&self) -> bool {
        self.progress.best_score >= self.constraints.mastery_threshold
    }

    /// Whether the attempt cap has been exhausted.
    pub fn attempts_exhausted(&self) -> bool {
        self.constraints
            .max_attempts
            .is_some_and(|max| self.progress.attempts >= max)
    }

    /// Seconds spent since activation, per the given clock reading.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.progress
            .started_at
            .map(|t| now.signed_duration_since(t).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Derive the caller-facing booleans from (phase, progress, constraints).
    ///
    /// Computed once per query rather than maintained as stored flags.
    pub fn flags(&self, now: DateTime<Utc>) -> ScreenFlags {
        let active = self.phase == ScreenPhase::Active;
        ScreenFlags {
            can_start: matches!(self.phase, ScreenPhase::Unlocked),
            can_submit: active && !self.attempts_exhausted(),
            can_request_hint: active && self.progress.hints_used < self.constraints.max_hints,
            can_complete: active
                && self.progress.attempts >= self.constraints.required_attempts
                && self.elapsed_seconds(now) >= self.constraints.min_time_seconds
                && self.mastery_reached(),
            is_terminal: self.phase.is_terminal(),
        }
    }
}

/// Derived, caller-facing view of what a screen currently permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenFlags {
    pub can_start: bool,
    pub can_submit: bool,
    pub can_request_hint: bool,
    pub can_complete: bool,
    pub is_terminal: bool,
}

/// Which constraint rejected a proposed action.
///
/// Serialized (and displayed) in SCREAMING_SNAKE_CASE so callers get stable
/// machine-readable reasons like `MAX_ATTEMPTS_REACHED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    /// The screen's phase does not permit the action
    PhaseGate,
    /// Sliding-window rate limit exceeded
    RateLimitExceeded,
    /// Cooldown since the last attempt has not elapsed
    CooldownActive,
    /// The attempt cap is exhausted
    MaxAttemptsReached,
    /// Minimum time on screen has not elapsed (completion only)
    MinTimeNotElapsed,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PhaseGate => "PHASE_GATE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::CooldownActive => "COOLDOWN_ACTIVE",
            Self::MaxAttemptsReached => "MAX_ATTEMPTS_REACHED",
            Self::MinTimeNotElapsed => "MIN_TIME_NOT_ELAPSED",
        };
        write!(f, "{s}")
    }
}

/// A constraint rejection, with the wait hint where one is computable.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}")]
pub struct ConstraintViolation {
    /// Which check failed (first failing check in precedence order)
    pub kind: ConstraintKind,

    /// How long until a retry could succeed, when known
    pub retry_after: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn active_screen() -> ScreenState {
        let mut screen = ScreenState::new(SessionId::from("sess_1"), ScreenType::Practice, "loops");
        screen.phase = ScreenPhase::Active;
        screen
    }

    #[test]
    fn rate_window_prunes_old_submissions() {
        let now = Utc::now();
        let mut progress = ScreenProgress::default();
        progress.note_submission(now - TimeDelta::seconds(90));
        progress.note_submission(now - TimeDelta::seconds(30));
        progress.note_submission(now);
        assert_eq!(progress.submissions_in_window(now), 2);
    }

    #[test]
    fn consume_attempt_tracks_best_score() {
        let now = Utc::now();
        let mut progress = ScreenProgress::default();
        progress.consume_attempt(Some(0.6), now);
        progress.consume_attempt(Some(0.4), now);
        assert_eq!(progress.attempts, 2);
        assert!((progress.best_score - 0.6).abs() < f32::EPSILON);
        assert_eq!(progress.last_attempt_at, Some(now));
    }

    #[test]
    fn attempts_exhausted_respects_cap() {
        let mut screen = active_screen();
        screen.constraints.max_attempts = Some(2);
        assert!(!screen.attempts_exhausted());
        screen.progress.attempts = 2;
        assert!(screen.attempts_exhausted());
    }

    #[test]
    fn flags_derivation() {
        let now = Utc::now();
        let mut screen = active_screen();
        screen.constraints.required_attempts = 1;
        screen.constraints.mastery_threshold = 0.7;
        screen.progress.started_at = Some(now - TimeDelta::seconds(10));

        let flags = screen.flags(now);
        assert!(flags.can_submit);
        assert!(!flags.can_complete, "no attempts, no mastery yet");

        screen.progress.consume_attempt(Some(0.8), now);
        let flags = screen.flags(now);
        assert!(flags.can_complete);
    }

    #[test]
    fn constraint_kind_displays_screaming_snake() {
        assert_eq!(
            ConstraintKind::MaxAttemptsReached.to_string(),
            "MAX_ATTEMPTS_REACHED"
        );
        assert_eq!(
            ConstraintKind::RateLimitExceeded.to_string(),
            "RATE_LIMIT_EXCEEDED"
        );
    }

    #[test]
    fn locked_screen_cannot_submit() {
        let screen = ScreenState::new(SessionId::from("s"), ScreenType::Concept, "intro");
        let flags = screen.flags(Utc::now());
        assert!(!flags.can_submit);
        assert!(!flags.can_start, "locked, not unlocked");
    }
}
