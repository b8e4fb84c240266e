//! Generation driver — deadline enforcement and transient retry with
//! exponential backoff around the generation port.
//!
//! The driver buffers the full response: validation tiers need finalized
//! text, so chunks are collected here and replayed to the caller only after
//! the draft is accepted.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mentora_core::error::GenerationError;
use mentora_core::generation::{GenerationPort, GenerationRequest};

/// A fully buffered generation result.
#[derive(Debug, Clone)]
pub struct GeneratedDraft {
    /// The concatenated response text
    pub text: String,

    /// The chunk boundaries as they arrived, for replay after acceptance
    pub chunks: Vec<String>,
}

/// Drives one logical generation: deadline, transient retries, buffering.
#[derive(Clone)]
pub struct GenerationDriver {
    port: Arc<dyn GenerationPort>,
    deadline: Duration,
    transient_retries: u32,
    backoff_base: Duration,
}

impl GenerationDriver {
    pub fn new(
        port: Arc<dyn GenerationPort>,
        deadline: Duration,
        transient_retries: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            port,
            deadline,
            transient_retries,
            backoff_base,
        }
    }

    /// Run one generation to completion, retrying transient failures.
    ///
    /// Cancellation is honored between attempts and during backoff; a
    /// successful drain is returned even if the token fired mid-flight —
    /// the caller's epoch check decides whether the result may commit.
    pub async fn run(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GeneratedDraft, GenerationError> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            match self.attempt(request.clone(), cancel).await {
                Ok(draft) => return Ok(draft),
                Err(e) if e.is_transient() && attempt < self.transient_retries => {
                    attempt += 1;
                    let backoff = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        backend = self.port.name(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient generation failure; backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GeneratedDraft, GenerationError> {
        let mut rx = self
            .port
            .generate(request, self.deadline, cancel.child_token())
            .await?;

        let drain = async {
            let mut text = String::new();
            let mut chunks = Vec::new();
            while let Some(item) = rx.recv().await {
                let chunk = item?;
                if !chunk.content.is_empty() {
                    text.push_str(&chunk.content);
                    chunks.push(chunk.content);
                }
                if chunk.done {
                    break;
                }
            }
            Ok(GeneratedDraft { text, chunks })
        };

        let draft: GeneratedDraft = match tokio::time::timeout(self.deadline, drain).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GenerationError::Timeout {
                    deadline_secs: self.deadline.as_secs(),
                });
            }
        };

        // A backend that reacts to cancellation by closing the stream early
        // can leave an empty drain; surface that as cancelled, not success.
        if draft.text.is_empty() && cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        debug!(
            backend = self.port.name(),
            chars = draft.text.len(),
            chunks = draft.chunks.len(),
            "Generation drained"
        );
        Ok(draft)
    }
}
