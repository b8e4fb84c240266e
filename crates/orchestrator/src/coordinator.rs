//! Interaction coordinator — per-session epoch and in-flight bookkeeping.
//!
//! Each session has a monotonically increasing generation epoch. Admitting
//! a submission bumps the epoch and cancels whatever was in flight; the
//! orchestrator discards any result whose epoch no longer matches. The
//! cancellation token is cooperative — a generation that misses it may run
//! to completion, but its stale epoch keeps the result from committing.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mentora_core::interaction::InteractionId;
use mentora_core::session::SessionId;

/// What [`InteractionCoordinator::admit`] hands back.
pub struct Admission {
    /// The epoch assigned to the new submission
    pub epoch: u64,

    /// Cancellation token for the new submission's pipeline
    pub cancel: CancellationToken,

    /// The prior in-flight interaction, now cancelled, if there was one
    pub superseded: Option<InteractionId>,
}

struct Inflight {
    interaction_id: InteractionId,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionSlot {
    epoch: u64,
    inflight: Option<Inflight>,
}

/// Tracks epochs and in-flight submissions per session.
#[derive(Default)]
pub struct InteractionCoordinator {
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl InteractionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a submission: cancel any in-flight prior, bump the epoch, and
    /// hand out a fresh cancellation token.
    pub async fn admit(&self, session: &SessionId, interaction: &InteractionId) -> Admission {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(session.0.clone()).or_default();

        let superseded = slot.inflight.take().map(|prev| {
            prev.cancel.cancel();
            debug!(
                session_id = %session,
                superseded = %prev.interaction_id,
                by = %interaction,
                "Superseding in-flight interaction"
            );
            prev.interaction_id
        });

        slot.epoch += 1;
        let cancel = CancellationToken::new();
        slot.inflight = Some(Inflight {
            interaction_id: interaction.clone(),
            cancel: cancel.clone(),
        });

        Admission {
            epoch: slot.epoch,
            cancel,
            superseded,
        }
    }

    /// The staleness check used before any commit.
    pub async fn is_current(&self, session: &SessionId, epoch: u64) -> bool {
        self.slots
            .lock()
            .await
            .get(&session.0)
            .is_some_and(|slot| slot.epoch == epoch)
    }

    /// Clear the in-flight record once a pipeline reaches a terminal state,
    /// provided it is still the current epoch.
    pub async fn settle(&self, session: &SessionId, epoch: u64) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&session.0) {
            if slot.epoch == epoch {
                slot.inflight = None;
            }
        }
    }

    /// The session's current epoch (0 if nothing was ever admitted).
    pub async fn current_epoch(&self, session: &SessionId) -> u64 {
        self.slots
            .lock()
            .await
            .get(&session.0)
            .map(|slot| slot.epoch)
            .unwrap_or(0)
    }
}
