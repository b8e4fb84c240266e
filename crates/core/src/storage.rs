//! Storage port — abstract persistence for sessions, screens, learner
//! memory, and interactions.
//!
//! The orchestrator never reports success to a caller until the relevant
//! write has succeeded. [`StoragePort::commit_interaction`] is the commit
//! boundary: an interaction's terminal state, the screen progress it
//! affects, and any memory mutation become durable together, so a crash can
//! never leave an interaction `committed` without its memory update.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::interaction::{Interaction, InteractionId};
use crate::learner::LearnerMemory;
use crate::profile::ProfileSnapshot;
use crate::screen::{ScreenId, ScreenState};
use crate::session::{LearnerId, Session, SessionId};

/// The storage backend trait.
///
/// Implementations: in-memory (tests, ephemeral sessions), JSON-file.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// The backend name (e.g., "in_memory", "json_file").
    fn name(&self) -> &str;

    async fn load_session(&self, id: &SessionId) -> Result<Session, StorageError>;

    async fn save_session(&self, session: &Session) -> Result<(), StorageError>;

    async fn load_screen(&self, id: &ScreenId) -> Result<ScreenState, StorageError>;

    async fn save_screen(&self, screen: &ScreenState) -> Result<(), StorageError>;

    /// All screens belonging to a session, in stable id order.
    async fn screens_for_session(
        &self,
        session: &SessionId,
    ) -> Result<Vec<ScreenState>, StorageError>;

    async fn load_memory(&self, learner: &LearnerId) -> Result<LearnerMemory, StorageError>;

    async fn save_memory(&self, memory: &LearnerMemory) -> Result<(), StorageError>;

    /// The immutable profile snapshot embedded in a session.
    async fn load_profile_snapshot(
        &self,
        session: &SessionId,
    ) -> Result<ProfileSnapshot, StorageError>;

    /// Record a freshly admitted interaction.
    async fn append_interaction(&self, interaction: &Interaction) -> Result<(), StorageError>;

    /// Persist a non-terminal state change on an interaction.
    async fn update_interaction(&self, interaction: &Interaction) -> Result<(), StorageError>;

    async fn load_interaction(&self, id: &InteractionId) -> Result<Interaction, StorageError>;

    /// The most recent committed interactions for a screen, oldest first.
    async fn history(
        &self,
        screen: &ScreenId,
        limit: usize,
    ) -> Result<Vec<Interaction>, StorageError>;

    /// The commit boundary: interaction terminal state, screen progress, and
    /// (for accepted interactions) the memory mutation persist atomically.
    async fn commit_interaction(
        &self,
        interaction: &Interaction,
        screen: &ScreenState,
        memory: Option<&LearnerMemory>,
    ) -> Result<(), StorageError>;
}
