//! File-based backend — the whole store as one JSON document.
//!
//! State is loaded into memory on creation and flushed on every mutation.
//! Flushes go through a write-then-rename so a crash mid-write leaves the
//! previous document intact, which preserves the commit-boundary guarantee
//! across process restarts.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::state::StoreState;
use mentora_core::error::StorageError;
use mentora_core::interaction::{Interaction, InteractionId};
use mentora_core::learner::LearnerMemory;
use mentora_core::profile::ProfileSnapshot;
use mentora_core::screen::{ScreenId, ScreenState};
use mentora_core::session::{LearnerId, Session, SessionId};
use mentora_core::storage::StoragePort;

/// A JSON-file-backed store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
}

impl JsonFileStore {
    /// Open (or create) a store at the given path.
    ///
    /// A missing file starts an empty store; a corrupted file is an error
    /// rather than silent data loss.
    pub fn new(path: PathBuf) -> Result<Self, StorageError> {
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        debug!(path = %path.display(), "JSON file store opened");
        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Flush the current state to disk via write-then-rename.
    fn flush(&self, state: &StoreState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Backend(format!("failed to create store directory: {e}"))
            })?;
        }
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::Backend(format!("failed to serialize store: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &content)
            .map_err(|e| StorageError::Backend(format!("failed to write store: {e}")))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            // Best effort cleanup; the rename failure is the real error.
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                warn!(error = %cleanup, "failed to remove temp store file");
            }
            StorageError::Backend(format!("failed to replace store: {e}"))
        })?;
        Ok(())
    }
}

#[async_trait]
impl StoragePort for JsonFileStore {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn load_session(&self, id: &SessionId) -> Result<Session, StorageError> {
        self.state.read().await.load_session(id)
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.save_session(session);
        self.flush(&state)
    }

    async fn load_screen(&self, id: &ScreenId) -> Result<ScreenState, StorageError> {
        self.state.read().await.load_screen(id)
    }

    async fn save_screen(&self, screen: &ScreenState) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.save_screen(screen);
        self.flush(&state)
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
        let mut state = self.state.write().await;
        state.save_memory(memory);
        self.flush(&state)
    }

    async fn load_profile_snapshot(
        &self,
        session: &SessionId,
    ) -> Result<ProfileSnapshot, StorageError> {
        self.state.read().await.load_profile_snapshot(session)
    }

    async fn append_interaction(&self, interaction: &Interaction) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.append_interaction(interaction)?;
        self.flush(&state)
    }

    async fn update_interaction(&self, interaction: &Interaction) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.update_interaction(interaction)?;
        self.flush(&state)
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
        let mut state = self.state.write().await;
        state.commit_interaction(interaction, screen, memory)?;
        self.flush(&state)
    }
}
