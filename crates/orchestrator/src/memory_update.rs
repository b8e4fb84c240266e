//! Memory updater — pure, idempotent application of one committed
//! interaction to learner memory.
//!
//! The updater never touches storage; the caller persists the returned
//! value inside the interaction's commit boundary. Applying the same
//! interaction id twice is a no-op (the applied-interaction set is the
//! idempotency key), and interactions that are not `Committed` are refused
//! outright.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::insights::DerivedInsights;
use mentora_core::interaction::{Interaction, InteractionState};
use mentora_core::learner::{ConceptMastery, LearnerMemory, Misconception, ProgressMarker, MAX_MASTERY_LEVEL};

/// Apply one committed interaction's insights to memory, returning the new
/// memory value. The input is never mutated.
pub fn update(
    memory: &LearnerMemory,
    interaction: &Interaction,
    insights: &DerivedInsights,
    now: DateTime<Utc>,
) -> LearnerMemory {
    let mut next = memory.clone();

    if interaction.state != InteractionState::Committed {
        debug!(
            interaction_id = %interaction.id,
            state = %interaction.state,
            "Refusing memory update for non-committed interaction"
        );
        return next;
    }
    if next.has_applied(&interaction.id.0) {
        debug!(interaction_id = %interaction.id, "Interaction already applied; no-op");
        return next;
    }

    for concept in &insights.concepts_practiced {
        match next.concepts.iter_mut().find(|c| c.concept == *concept) {
            Some(entry) => {
                if entry.mastery_level < MAX_MASTERY_LEVEL {
                    entry.mastery_level += 1;
                    if entry.mastery_level == MAX_MASTERY_LEVEL {
                        next.progress_markers.push(ProgressMarker {
                            label: format!("mastered {concept}"),
                            at: now,
                        });
                    }
                }
                entry.last_practiced = now;
            }
            None => next.concepts.push(ConceptMastery {
                concept: concept.clone(),
                mastery_level: 1,
                first_seen: now,
                last_practiced: now,
            }),
        }
    }

    for concept in &insights.corrections {
        match next
            .misconceptions
            .iter_mut()
            .find(|m| m.concept == *concept)
        {
            Some(entry) => entry.correction_attempts += 1,
            None => next.misconceptions.push(Misconception {
                concept: concept.clone(),
                resolved: false,
                correction_attempts: 1,
            }),
        }
    }

    for concept in &insights.resolved {
        if let Some(entry) = next
            .misconceptions
            .iter_mut()
            .find(|m| m.concept == *concept)
        {
            entry.resolved = true;
        }
    }

    for strength in &insights.strengths {
        if !next.strengths.contains(strength) {
            next.strengths.push(strength.clone());
        }
    }
    for weakness in &insights.weaknesses {
        if !next.weaknesses.contains(weakness) {
            next.weaknesses.push(weakness.clone());
        }
    }
    for label in &insights.markers {
        next.progress_markers.push(ProgressMarker {
            label: label.clone(),
            at: now,
        });
    }

    next.applied_interactions.push(interaction.id.0.clone());
    next
}
