//! Response validator — ordered, tiered rule pipeline over generated text.
//!
//! Three tiers, evaluated in severity order. Tier membership is closed
//! (Critical, High, Medium map to fixed actions); the check list inside a
//! tier is open — each check is a tagged predicate `{id, fn}` and callers
//! can register their own. Within a tier every check runs so the caller
//! gets the full violation list; across tiers, a Critical hit
//! short-circuits and lower tiers are skipped.
//!
//! Validation runs against finalized text only: safety and style checks
//! need the whole response, so streamed chunks are buffered upstream.

pub mod checks;

use tracing::debug;

use mentora_core::profile::ProfileSnapshot;
use mentora_core::screen::ScreenState;
use mentora_core::validation::{Severity, ValidationAction, ValidationResult, Violation};

/// Regeneration ceiling when the worst hit is a High-tier check.
pub const REGEN_CEILING_HIGH: u32 = 2;

/// Regeneration ceiling when the worst hit is a Medium-tier check.
pub const REGEN_CEILING_MEDIUM: u32 = 1;

/// What the predicates can see besides the response text.
pub struct CheckContext<'a> {
    /// The session's instructor snapshot
    pub profile: &'a ProfileSnapshot,

    /// The screen the response targets
    pub screen: &'a ScreenState,

    /// The learner input that produced the response
    pub input: &'a str,
}

type CheckFn = Box<dyn Fn(&str, &CheckContext<'_>) -> Option<String> + Send + Sync>;

/// A single tagged predicate. Returns `Some(detail)` when violated.
pub struct Check {
    id: String,
    predicate: CheckFn,
}

impl Check {
    pub fn new(
        id: impl Into<String>,
        predicate: impl Fn(&str, &CheckContext<'_>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The tiered validation pipeline.
pub struct ResponseValidator {
    critical: Vec<Check>,
    high: Vec<Check>,
    medium: Vec<Check>,
}

impl ResponseValidator {
    /// A validator with no checks; everything passes.
    pub fn empty() -> Self {
        Self {
            critical: Vec::new(),
            high: Vec::new(),
            medium: Vec::new(),
        }
    }

    /// The shipped default rule set (heuristic predicate bodies).
    pub fn with_default_checks() -> Self {
        let mut validator = Self::empty();
        for check in checks::default_critical_checks() {
            validator.register(Severity::Critical, check);
        }
        for check in checks::default_high_checks() {
            validator.register(Severity::High, check);
        }
        for check in checks::default_medium_checks() {
            validator.register(Severity::Medium, check);
        }
        validator
    }

    /// Register a check into the tier for the given severity.
    pub fn register(&mut self, severity: Severity, check: Check) {
        match severity {
            Severity::Critical => self.critical.push(check),
            Severity::High => self.high.push(check),
            Severity::Medium => self.medium.push(check),
        }
    }

    /// Run the tiers over a finalized response.
    pub fn validate(&self, text: &str, ctx: &CheckContext<'_>) -> ValidationResult {
        // Tier A: any hit rejects immediately; lower tiers are skipped.
        let critical = Self::run_tier(&self.critical, Severity::Critical, text, ctx);
        if !critical.is_empty() {
            debug!(hits = critical.len(), "Tier A rejection");
            return ValidationResult {
                action: ValidationAction::Reject,
                violations: critical,
            };
        }

        // Tiers B and C both run so the caller sees the full list.
        let mut violations = Self::run_tier(&self.high, Severity::High, text, ctx);
        let high_hits = violations.len();
        violations.extend(Self::run_tier(&self.medium, Severity::Medium, text, ctx));

        let action = if violations.is_empty() {
            ValidationAction::Accept
        } else {
            ValidationAction::Regenerate
        };
        if !violations.is_empty() {
            debug!(
                high = high_hits,
                medium = violations.len() - high_hits,
                "Validation requested regeneration"
            );
        }
        ValidationResult { action, violations }
    }

    fn run_tier(
        tier: &[Check],
        severity: Severity,
        text: &str,
        ctx: &CheckContext<'_>,
    ) -> Vec<Violation> {
        tier.iter()
            .filter_map(|check| {
                (check.predicate)(text, ctx).map(|detail| Violation {
                    check_id: check.id.clone(),
                    severity,
                    detail,
                })
            })
            .collect()
    }
}

/// How many regenerations the result's worst tier permits.
///
/// Critical rejections and clean accepts permit none.
pub fn retry_ceiling(result: &ValidationResult) -> u32 {
    match result.worst_severity() {
        Some(Severity::High) => REGEN_CEILING_HIGH,
        Some(Severity::Medium) => REGEN_CEILING_MEDIUM,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mentora_core::profile::{InstructorProfile, TeachingStyle};
    use mentora_core::screen::{ScreenPhase, ScreenType};
    use mentora_core::session::SessionId;

    fn fixture() -> (ProfileSnapshot, ScreenState) {
        let profile = InstructorProfile::default_profile().snapshot(Utc::now());
        let mut screen = ScreenState::new(SessionId::from("s1"), ScreenType::Practice, "loops");
        screen.phase = ScreenPhase::Active;
        screen.concepts = vec!["for-loops".into()];
        (profile, screen)
    }

    #[test]
    fn clean_response_accepts() {
        let (profile, screen) = fixture();
        let validator = ResponseValidator::with_default_checks();
        let ctx = CheckContext {
            profile: &profile,
            screen: &screen,
            input: "how do loops stop?",
        };
        let text = "Good question! Think about the loop condition — what value \
                    does the counter need to reach before the loop exits?";
        let result = validator.validate(text, &ctx);
        assert!(result.is_accept(), "violations: {:?}", result.violations);
    }

    #[test]
    fn critical_hit_rejects_and_skips_lower_tiers() {
        let (profile, screen) = fixture();
        let validator = ResponseValidator::with_default_checks();
        let ctx = CheckContext {
            profile: &profile,
            screen: &screen,
            input: "is this right?",
        };
        // Triggers Tier A (fabricated certainty) AND would trigger Tier C
        // (no verification question for a Socratic profile).
        let text = "This is 100% certain and cannot possibly be wrong.";
        let result = validator.validate(text, &ctx);

        assert_eq!(result.action, ValidationAction::Reject);
        assert!(result
            .violations
            .iter()
            .all(|v| v.severity == Severity::Critical));
        assert_eq!(retry_ceiling(&result), 0);
    }

    #[test]
    fn direct_answer_requests_regeneration() {
        let (profile, screen) = fixture();
        let validator = ResponseValidator::with_default_checks();
        let ctx = CheckContext {
            profile: &profile,
            screen: &screen,
            input: "what does this print?",
        };
        let text = "The answer is 42. Does that make sense?";
        let result = validator.validate(text, &ctx);

        assert_eq!(result.action, ValidationAction::Regenerate);
        assert!(result.violations.iter().any(|v| v.check_id == "direct-answer"));
        assert_eq!(retry_ceiling(&result), REGEN_CEILING_HIGH);
    }

    #[test]
    fn medium_only_hit_gets_lower_ceiling() {
        let (profile, screen) = fixture();
        let validator = ResponseValidator::with_default_checks();
        let ctx = CheckContext {
            profile: &profile,
            screen: &screen,
            input: "explain loops",
        };
        // Socratic profile, no verification question anywhere.
        let text = "A loop repeats its body while the condition holds.";
        let result = validator.validate(text, &ctx);

        assert_eq!(result.action, ValidationAction::Regenerate);
        assert_eq!(result.worst_severity(), Some(Severity::Medium));
        assert_eq!(retry_ceiling(&result), REGEN_CEILING_MEDIUM);
    }

    #[test]
    fn all_checks_in_a_tier_run() {
        let (profile, screen) = fixture();
        let mut validator = ResponseValidator::empty();
        validator.register(
            Severity::High,
            Check::new("always-a", |_, _| Some("a".into())),
        );
        validator.register(
            Severity::High,
            Check::new("always-b", |_, _| Some("b".into())),
        );
        let ctx = CheckContext {
            profile: &profile,
            screen: &screen,
            input: "",
        };
        let result = validator.validate("anything?", &ctx);
        assert_eq!(result.violations.len(), 2, "both High checks collected");
    }

    #[test]
    fn custom_check_registration() {
        let (profile, screen) = fixture();
        let mut validator = ResponseValidator::empty();
        validator.register(
            Severity::Critical,
            Check::new("no-latin", |text, _| {
                text.contains("lorem").then(|| "placeholder text".to_string())
            }),
        );
        let ctx = CheckContext {
            profile: &profile,
            screen: &screen,
            input: "",
        };
        assert_eq!(
            validator.validate("lorem ipsum?", &ctx).action,
            ValidationAction::Reject
        );
        assert!(validator.validate("real content?", &ctx).is_accept());
    }

    #[test]
    fn direct_style_does_not_require_question() {
        let (mut profile, screen) = fixture();
        profile.style = TeachingStyle::Direct;
        let validator = ResponseValidator::with_default_checks();
        let ctx = CheckContext {
            profile: &profile,
            screen: &screen,
            input: "explain loops",
        };
        let text = "A loop repeats its body while the condition holds.";
        assert!(validator.validate(text, &ctx).is_accept());
    }
}
