//! Constraint engine — pure, fixed-precedence pre-checks for screen actions.
//!
//! Checks run in a fixed order and the first failure short-circuits with a
//! specific reason:
//!
//! 1. Phase gate (the screen's phase must permit the action)
//! 2. Rate limit (sliding one-minute window)
//! 3. Cooldown since the last consumed attempt
//! 4. Attempt cap
//! 5. Minimum time on screen (enforced for completion only)
//!
//! Evaluation is side-effect free in both directions: a denial mutates
//! nothing, and an allowance mutates nothing — progress counters move only
//! after an interaction commits.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use mentora_core::screen::{ConstraintKind, ConstraintViolation, ScreenPhase, ScreenState};

/// The action a caller proposes to take against a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposedAction {
    /// Activate the screen.
    Start,
    /// Submit learner text.
    Submit,
    /// Request a hint.
    Hint,
    /// Complete the screen.
    Complete,
}

/// The outcome of evaluating constraints against a proposed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Allowed,
    Denied(ConstraintViolation),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Convert to a `Result` for `?`-style use at call sites.
    pub fn into_result(self) -> Result<(), ConstraintViolation> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(violation) => Err(violation),
        }
    }
}

/// The constraint engine. Stateless; all inputs arrive per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEngine;

impl ConstraintEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a proposed action against a screen's current state.
    pub fn evaluate(
        &self,
        screen: &ScreenState,
        action: ProposedAction,
        now: DateTime<Utc>,
    ) -> Decision {
        if let Some(violation) = self.phase_gate(screen, action) {
            return self.deny(screen, action, violation);
        }
        if matches!(action, ProposedAction::Submit | ProposedAction::Hint) {
            if let Some(violation) = self.rate_limit(screen, now) {
                return self.deny(screen, action, violation);
            }
            if let Some(violation) = self.cooldown(screen, now) {
                return self.deny(screen, action, violation);
            }
        }
        if action == ProposedAction::Submit {
            if let Some(violation) = self.max_attempts(screen) {
                return self.deny(screen, action, violation);
            }
        }
        if action == ProposedAction::Complete {
            if let Some(violation) = self.min_time(screen, now) {
                return self.deny(screen, action, violation);
            }
        }
        Decision::Allowed
    }

    fn deny(
        &self,
        screen: &ScreenState,
        action: ProposedAction,
        violation: ConstraintViolation,
    ) -> Decision {
        debug!(
            screen_id = %screen.id,
            ?action,
            constraint = %violation.kind,
            "Constraint denied action"
        );
        Decision::Denied(violation)
    }

    fn phase_gate(&self, screen: &ScreenState, action: ProposedAction) -> Option<ConstraintViolation> {
        let permitted = match action {
            ProposedAction::Start => {
                matches!(screen.phase, ScreenPhase::Unlocked | ScreenPhase::Active)
            }
            ProposedAction::Submit | ProposedAction::Hint | ProposedAction::Complete => {
                screen.phase == ScreenPhase::Active
            }
        };
        (!permitted).then(|| ConstraintViolation {
            kind: ConstraintKind::PhaseGate,
            retry_after: None,
        })
    }

    fn rate_limit(&self, screen: &ScreenState, now: DateTime<Utc>) -> Option<ConstraintViolation> {
        let limit = screen.constraints.rate_limit_per_minute as usize;
        if limit == 0 {
            return None;
        }
        let window: Vec<DateTime<Utc>> = screen
            .progress
            .recent_submissions
            .iter()
            .copied()
            .filter(|t| {
                now.signed_duration_since(*t).num_seconds()
                    < mentora_core::screen::RATE_WINDOW_SECS
            })
            .collect();
        if window.len() < limit {
            return None;
        }
        // The window frees a slot when its oldest entry ages out.
        let oldest = window.iter().min().copied();
        let retry_after = oldest.and_then(|t| {
            (t + TimeDelta::seconds(mentora_core::screen::RATE_WINDOW_SECS))
                .signed_duration_since(now)
                .to_std()
                .ok()
        });
        Some(ConstraintViolation {
            kind: ConstraintKind::RateLimitExceeded,
            retry_after,
        })
    }

    fn cooldown(&self, screen: &ScreenState, now: DateTime<Utc>) -> Option<ConstraintViolation> {
        let cooldown = screen.constraints.cooldown_seconds;
        if cooldown == 0 {
            return None;
        }
        let last = screen.progress.last_attempt_at?;
        let ready_at = last + TimeDelta::seconds(cooldown as i64);
        if now >= ready_at {
            return None;
        }
        Some(ConstraintViolation {
            kind: ConstraintKind::CooldownActive,
            retry_after: ready_at.signed_duration_since(now).to_std().ok(),
        })
    }

    fn max_attempts(&self, screen: &ScreenState) -> Option<ConstraintViolation> {
        screen.attempts_exhausted().then_some(ConstraintViolation {
            kind: ConstraintKind::MaxAttemptsReached,
            retry_after: None,
        })
    }

    fn min_time(&self, screen: &ScreenState, now: DateTime<Utc>) -> Option<ConstraintViolation> {
        let required = screen.constraints.min_time_seconds;
        let elapsed = screen.elapsed_seconds(now);
        if elapsed >= required {
            return None;
        }
        Some(ConstraintViolation {
            kind: ConstraintKind::MinTimeNotElapsed,
            retry_after: Some(Duration::from_secs(required - elapsed)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentora_core::screen::{ScreenState, ScreenType};
    use mentora_core::session::SessionId;

    fn active_screen() -> ScreenState {
        let mut screen =
            ScreenState::new(SessionId::from("sess_1"), ScreenType::Practice, "loops");
        screen.phase = ScreenPhase::Active;
        screen
    }

    fn denied_kind(decision: Decision) -> ConstraintKind {
        match decision {
            Decision::Denied(v) => v.kind,
            Decision::Allowed => panic!("expected denial"),
        }
    }

    #[test]
    fn submit_on_locked_screen_hits_phase_gate() {
        let engine = ConstraintEngine::new();
        let mut screen = active_screen();
        screen.phase = ScreenPhase::Locked;
        let decision = engine.evaluate(&screen, ProposedAction::Submit, Utc::now());
        assert_eq!(denied_kind(decision), ConstraintKind::PhaseGate);
    }

    #[test]
    fn start_allowed_on_unlocked() {
        let engine = ConstraintEngine::new();
        let mut screen = active_screen();
        screen.phase = ScreenPhase::Unlocked;
        assert!(engine
            .evaluate(&screen, ProposedAction::Start, Utc::now())
            .is_allowed());
    }

    #[test]
    fn rate_limit_denies_with_retry_after() {
        let engine = ConstraintEngine::new();
        let now = Utc::now();
        let mut screen = active_screen();
        screen.constraints.rate_limit_per_minute = 2;
        screen.progress.note_submission(now - TimeDelta::seconds(40));
        screen.progress.note_submission(now - TimeDelta::seconds(10));

        let decision = engine.evaluate(&screen, ProposedAction::Submit, now);
        match decision {
            Decision::Denied(v) => {
                assert_eq!(v.kind, ConstraintKind::RateLimitExceeded);
                // Oldest entry ages out 20s from now
                let retry = v.retry_after.expect("retry_after should be computable");
                assert!(retry <= Duration::from_secs(20));
                assert!(retry >= Duration::from_secs(18));
            }
            Decision::Allowed => panic!("expected rate-limit denial"),
        }
    }

    #[test]
    fn rate_limit_precedes_cooldown() {
        let engine = ConstraintEngine::new();
        let now = Utc::now();
        let mut screen = active_screen();
        // Violate both: window is full AND cooldown has not elapsed
        screen.constraints.rate_limit_per_minute = 1;
        screen.constraints.cooldown_seconds = 120;
        screen.progress.note_submission(now - TimeDelta::seconds(5));
        screen.progress.last_attempt_at = Some(now - TimeDelta::seconds(5));

        let decision = engine.evaluate(&screen, ProposedAction::Submit, now);
        assert_eq!(denied_kind(decision), ConstraintKind::RateLimitExceeded);
    }

    #[test]
    fn cooldown_denies_until_elapsed() {
        let engine = ConstraintEngine::new();
        let now = Utc::now();
        let mut screen = active_screen();
        screen.constraints.cooldown_seconds = 30;
        screen.progress.last_attempt_at = Some(now - TimeDelta::seconds(10));

        let decision = engine.evaluate(&screen, ProposedAction::Submit, now);
        assert_eq!(denied_kind(decision), ConstraintKind::CooldownActive);

        let later = now + TimeDelta::seconds(25);
        assert!(engine
            .evaluate(&screen, ProposedAction::Submit, later)
            .is_allowed());
    }

    #[test]
    fn max_attempts_denies_third_submission() {
        let engine = ConstraintEngine::new();
        let now = Utc::now();
        let mut screen = active_screen();
        screen.constraints.max_attempts = Some(2);
        screen.progress.attempts = 2;

        let decision = engine.evaluate(&screen, ProposedAction::Submit, now);
        assert_eq!(denied_kind(decision), ConstraintKind::MaxAttemptsReached);
    }

    #[test]
    fn min_time_enforced_for_completion_only() {
        let engine = ConstraintEngine::new();
        let now = Utc::now();
        let mut screen = active_screen();
        screen.constraints.min_time_seconds = 60;
        screen.progress.started_at = Some(now - TimeDelta::seconds(20));

        // Submission is unaffected by min-time
        assert!(engine
            .evaluate(&screen, ProposedAction::Submit, now)
            .is_allowed());

        // Completion is gated
        let decision = engine.evaluate(&screen, ProposedAction::Complete, now);
        match decision {
            Decision::Denied(v) => {
                assert_eq!(v.kind, ConstraintKind::MinTimeNotElapsed);
                assert_eq!(v.retry_after, Some(Duration::from_secs(40)));
            }
            Decision::Allowed => panic!("expected min-time denial"),
        }
    }

    #[test]
    fn evaluation_has_no_side_effects() {
        let engine = ConstraintEngine::new();
        let now = Utc::now();
        let mut screen = active_screen();
        screen.constraints.rate_limit_per_minute = 1;
        screen.progress.note_submission(now);
        let before = screen.progress.clone();

        let _ = engine.evaluate(&screen, ProposedAction::Submit, now);
        assert_eq!(screen.progress.attempts, before.attempts);
        assert_eq!(
            screen.progress.recent_submissions.len(),
            before.recent_submissions.len()
        );
    }
}
