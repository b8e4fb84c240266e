//! The shared store document and the synchronous operations over it.
//!
//! Backends wrap this in a lock and add durability; the operation logic
//! lives here once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use mentora_core::error::StorageError;
use mentora_core::interaction::{Interaction, InteractionId, InteractionState};
use mentora_core::learner::LearnerMemory;
use mentora_core::profile::ProfileSnapshot;
use mentora_core::screen::{ScreenId, ScreenState};
use mentora_core::session::{LearnerId, Session, SessionId};

/// Everything a backend persists, keyed by id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub sessions: HashMap<String, Session>,
    pub screens: HashMap<String, ScreenState>,
    pub memories: HashMap<String, LearnerMemory>,
    pub interactions: HashMap<String, Interaction>,
    /// Append order of interactions, for history queries.
    pub interaction_log: Vec<String>,
}

impl StoreState {
    pub fn load_session(&self, id: &SessionId) -> Result<Session, StorageError> {
        self.sessions
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                kind: "session",
                id: id.0.clone(),
            })
    }

    pub fn save_session(&mut self, session: &Session) {
        self.sessions.insert(session.id.0.clone(), session.clone());
    }

    pub fn load_screen(&self, id: &ScreenId) -> Result<ScreenState, StorageError> {
        self.screens
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                kind: "screen",
                id: id.0.clone(),
            })
    }

    pub fn save_screen(&mut self, screen: &ScreenState) {
        self.screens.insert(screen.id.0.clone(), screen.clone());
    }

    pub fn screens_for_session(&self, session: &SessionId) -> Vec<ScreenState> {
        let mut screens: Vec<ScreenState> = self
            .screens
            .values()
            .filter(|s| s.session_id == *session)
            .cloned()
            .collect();
        screens.sort_by(|a, b| a.id.cmp(&b.id));
        screens
    }

    pub fn load_memory(&self, learner: &LearnerId) -> Result<LearnerMemory, StorageError> {
        // A learner with no record yet starts from empty memory.
        Ok(self
            .memories
            .get(&learner.0)
            .cloned()
            .unwrap_or_else(|| LearnerMemory::new(learner.clone())))
    }

    pub fn save_memory(&mut self, memory: &LearnerMemory) {
        self.memories
            .insert(memory.learner_id.0.clone(), memory.clone());
    }

    pub fn load_profile_snapshot(
        &self,
        session: &SessionId,
    ) -> Result<ProfileSnapshot, StorageError> {
        self.load_session(session).map(|s| s.profile)
    }

    pub fn append_interaction(&mut self, interaction: &Interaction) -> Result<(), StorageError> {
        if self.interactions.contains_key(&interaction.id.0) {
            return Err(StorageError::Conflict(format!(
                "interaction '{}' already exists",
                interaction.id
            )));
        }
        self.interactions
            .insert(interaction.id.0.clone(), interaction.clone());
        self.interaction_log.push(interaction.id.0.clone());
        Ok(())
    }

    pub fn update_interaction(&mut self, interaction: &Interaction) -> Result<(), StorageError> {
        if !self.interactions.contains_key(&interaction.id.0) {
            return Err(StorageError::NotFound {
                kind: "interaction",
                id: interaction.id.0.clone(),
            });
        }
        self.interactions
            .insert(interaction.id.0.clone(), interaction.clone());
        Ok(())
    }

    pub fn load_interaction(&self, id: &InteractionId) -> Result<Interaction, StorageError> {
        self.interactions
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                kind: "interaction",
                id: id.0.clone(),
            })
    }

    pub fn history(&self, screen: &ScreenId, limit: usize) -> Vec<Interaction> {
        let committed: Vec<Interaction> = self
            .interaction_log
            .iter()
            .filter_map(|id| self.interactions.get(id))
            .filter(|i| i.screen_id == *screen && i.state == InteractionState::Committed)
            .cloned()
            .collect();
        let start = committed.len().saturating_sub(limit);
        committed[start..].to_vec()
    }

    /// The commit boundary, applied under one write guard.
    pub fn commit_interaction(
        &mut self,
        interaction: &Interaction,
        screen: &ScreenState,
        memory: Option<&LearnerMemory>,
    ) -> Result<(), StorageError> {
        if !interaction.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "commit of non-terminal interaction '{}'",
                interaction.id
            )));
        }
        self.update_interaction(interaction)?;
        self.save_screen(screen);
        if let Some(memory) = memory {
            self.save_memory(memory);
        }
        Ok(())
    }
}
