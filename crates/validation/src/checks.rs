//! The shipped default checks, one constructor per tier.
//!
//! Rule bodies are heuristics; deployments replace or extend them through
//! [`ResponseValidator::register`](crate::ResponseValidator::register).
//! What is fixed is the tier structure and ordering, not these predicates.

use regex::Regex;
use std::sync::LazyLock;

use crate::Check;
use mentora_core::profile::{TeachingStyle, Verbosity};
use mentora_prompt::SECTION_OPEN;

static FABRICATED_CERTAINTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(100%\s+certain|i\s+guarantee|cannot\s+possibly\s+be\s+wrong|no\s+possible\s+exception)\b")
        .expect("valid regex")
});

static DIRECT_ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\bthe\s+(final\s+|correct\s+)?answer\s+is\b|^\s*answer\s*[:=])")
        .expect("valid regex")
});

static IDENTITY_LEAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(system\s+prompt|my\s+instructions|section\s+marker)\b")
        .expect("valid regex")
});

/// Phrases that must never appear in instructor output.
const FORBIDDEN_PHRASES: &[&str] = &[
    "kill yourself",
    "you are hopeless",
    "give up on learning",
];

/// Responses longer than this with no overlap with the screen's topic or
/// concepts are treated as out-of-scope claims.
const SCOPE_DRIFT_MIN_LEN: usize = 600;

/// Terse-profile responses above this length deviate from the profile.
const TERSE_LIMIT: usize = 1200;

/// Hard structural cap on response length.
const MAX_RESPONSE_LEN: usize = 6000;

/// Tier A — critical: any hit rejects outright.
pub fn default_critical_checks() -> Vec<Check> {
    vec![
        Check::new("unsafe-content", |text, _ctx| {
            let lower = text.to_lowercase();
            FORBIDDEN_PHRASES
                .iter()
                .find(|p| lower.contains(*p))
                .map(|p| format!("forbidden phrase present: \"{p}\""))
        }),
        Check::new("fabricated-certainty", |text, _ctx| {
            FABRICATED_CERTAINTY
                .find(text)
                .map(|m| format!("overconfident claim: \"{}\"", m.as_str()))
        }),
        Check::new("scope-drift", |text, ctx| {
            if text.len() < SCOPE_DRIFT_MIN_LEN {
                return None;
            }
            let lower = text.to_lowercase();
            let mut anchors = vec![ctx.screen.topic.to_lowercase()];
            anchors.extend(ctx.screen.concepts.iter().map(|c| c.to_lowercase()));
            let on_topic = anchors
                .iter()
                .any(|a| !a.is_empty() && lower.contains(a.as_str()));
            (!on_topic).then(|| {
                format!(
                    "long response never touches \"{}\" or its concepts",
                    ctx.screen.topic
                )
            })
        }),
    ]
}

/// Tier B — high: any hit regenerates (ceiling 2).
pub fn default_high_checks() -> Vec<Check> {
    vec![
        Check::new("direct-answer", |text, ctx| {
            // Concept screens may explain outright; practice and assessment
            // screens must not hand over answers.
            use mentora_core::screen::ScreenType;
            if matches!(ctx.screen.screen_type, ScreenType::Concept) {
                return None;
            }
            DIRECT_ANSWER
                .find(text)
                .map(|m| format!("response hands over the answer: \"{}\"", m.as_str()))
        }),
        Check::new("identity-leakage", |text, _ctx| {
            if text.contains(SECTION_OPEN) {
                return Some("response contains a section boundary marker".into());
            }
            IDENTITY_LEAK
                .find(text)
                .map(|m| format!("response discusses its own instructions: \"{}\"", m.as_str()))
        }),
        Check::new("style-deviation", |text, ctx| {
            (ctx.profile.verbosity == Verbosity::Terse && text.len() > TERSE_LIMIT).then(|| {
                format!(
                    "terse profile but response runs {} chars",
                    text.len()
                )
            })
        }),
    ]
}

/// Tier C — medium: any hit regenerates (ceiling 1).
pub fn default_medium_checks() -> Vec<Check> {
    vec![
        Check::new("verification-question", |text, ctx| {
            (ctx.profile.style == TeachingStyle::Socratic && !text.contains('?'))
                .then(|| "socratic response ends without a verification question".to_string())
        }),
        Check::new("structure", |text, _ctx| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Some("empty response".into())
            } else if text.len() > MAX_RESPONSE_LEN {
                Some(format!("response exceeds {MAX_RESPONSE_LEN} chars"))
            } else {
                None
            }
        }),
    ]
}
