//! Insight derivation — what one accepted exchange says about the learner.
//!
//! Deterministic heuristics over the exchange text and screen context. The
//! outputs drive the memory updater; richer derivations (an assessment
//! model, rubric scoring) can replace this module without touching the
//! updater's contract.

use mentora_core::learner::LearnerMemory;
use mentora_core::screen::ScreenState;

/// What the memory updater applies for one committed interaction.
#[derive(Debug, Clone, Default)]
pub struct DerivedInsights {
    /// Concepts this exchange practiced (each advances one mastery level)
    pub concepts_practiced: Vec<String>,

    /// Misconceptions the response attempted to correct
    pub corrections: Vec<String>,

    /// Misconceptions considered resolved by this exchange
    pub resolved: Vec<String>,

    /// Strengths to record
    pub strengths: Vec<String>,

    /// Weaknesses to record
    pub weaknesses: Vec<String>,

    /// Milestone labels
    pub markers: Vec<String>,

    /// Attempt score in [0, 1]
    pub score: f32,
}

/// Misconceptions resolve once this many correction attempts land with a
/// strong score.
const RESOLUTION_ATTEMPTS: u32 = 3;

/// Scores at or above this mark an exchange as strong.
const STRONG_SCORE: f32 = 0.85;

/// Scores below this mark the screen topic as a weakness.
const WEAK_SCORE: f32 = 0.4;

/// Derive insights from one accepted exchange.
///
/// `regenerations` is how many validation retries the response consumed;
/// each one discounts the score.
pub fn derive(
    input: &str,
    response: &str,
    screen: &ScreenState,
    memory: &LearnerMemory,
    regenerations: u32,
) -> DerivedInsights {
    let haystack = format!("{} {}", input, response).to_lowercase();

    let mut concepts_practiced: Vec<String> = screen
        .concepts
        .iter()
        .filter(|c| haystack.contains(&c.to_lowercase()))
        .cloned()
        .collect();
    let coverage = if screen.concepts.is_empty() {
        1.0
    } else {
        concepts_practiced.len() as f32 / screen.concepts.len() as f32
    };
    // An exchange that names no declared concept still practices the topic.
    if concepts_practiced.is_empty() {
        concepts_practiced.push(screen.topic.clone());
    }

    let score =
        ((0.6 + 0.4 * coverage) * (1.0 - 0.15 * regenerations as f32)).clamp(0.0, 1.0);

    let mut corrections = Vec::new();
    let mut resolved = Vec::new();
    for misconception in memory.unresolved_misconceptions() {
        if haystack.contains(&misconception.concept.to_lowercase()) {
            corrections.push(misconception.concept.clone());
            if score >= STRONG_SCORE
                && misconception.correction_attempts + 1 >= RESOLUTION_ATTEMPTS
            {
                resolved.push(misconception.concept.clone());
            }
        }
    }

    let mut markers = Vec::new();
    if screen.progress.attempts == 0 {
        markers.push(format!("started {}", screen.topic));
    }

    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    if score >= STRONG_SCORE {
        strengths.push(screen.topic.clone());
    } else if score < WEAK_SCORE {
        weaknesses.push(screen.topic.clone());
    }

    DerivedInsights {
        concepts_practiced,
        corrections,
        resolved,
        strengths,
        weaknesses,
        markers,
        score,
    }
}
