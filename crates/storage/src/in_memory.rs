//! In-memory backend — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::state::StoreState;
use mentora_core::error::StorageError;
use mentora_core::interaction::{Interaction, InteractionId};
use mentora_core::learner::LearnerMemory;
use mentora_core::profile::ProfileSnapshot;
use mentora_core::screen::{ScreenId, ScreenState};
use mentora_core::session::{LearnerId, Session, SessionId};
use mentora_core::storage::StoragePort;

/// A store holding everything behind one in-process lock.
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoragePort for MemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load_session(&self, id: &SessionId) -> Result<Session, StorageError> {
        self.state.read().await.load_session(id)
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        self.state.write().await.save_session(session);
        Ok(())
    }

    async fn load_screen(&self, id: &ScreenId) -> Result<ScreenState, StorageError> {
        self.state.read().await.load_screen(id)
    }

    async fn save_screen(&self, screen: &ScreenState) -> Result<(), StorageError> {
        self.state.write().await.save_screen(screen);
        Ok(())
    }

    async fn screens_for_session(
        &self,
        session: &SessionId,
    ) -> Result<Vec<ScreenState>, StorageError> {
        Ok(self.state.read().await.screens_for_session(session))
    }

    async fn load_memory(&self, learner: &LearnerId) -> Result<LearnerMemory, StorageError> {
        self.state.read().await.load_memory(learner)
    }

    async fn save_memory(&self, memory: &LearnerMemory) -> Result<(), StorageError> {
        self.state.write().await.save_memory(memory);
        Ok(())
    }

    async fn load_profile_snapshot(
        &self,
        session: &SessionId,
    ) -> Result<ProfileSnapshot, StorageError> {
        self.state.read().await.load_profile_snapshot(session)
    }

    async fn append_interaction(&self, interaction: &Interaction) -> Result<(), StorageError> {
        self.state.write().await.append_interaction(interaction)
    }

    async fn update_interaction(&self, interaction: &Interaction) -> Result<(), StorageError> {
        self.state.write().await.update_interaction(interaction)
    }

    async fn load_interaction(&self, id: &InteractionId) -> Result<Interaction, StorageError> {
        self.state.read().await.load_interaction(id)
    }

    async fn history(
        &self,
        screen: &ScreenId,
        limit: usize,
    ) -> Result<Vec<Interaction>, StorageError> {
        Ok(self.state.read().await.history(screen, limit))
    }

    async fn commit_interaction(
        &self,
        interaction: &Interaction,
        screen: &ScreenState,
        memory: Option<&LearnerMemory>,
    ) -> Result<(), StorageError> {
        self.state
            .write()
            .await
            .commit_interaction(interaction, screen, memory)
    }
}
