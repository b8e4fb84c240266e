//! Generation port — the abstraction over the text-generation backend.
//!
//! The port knows how to turn an assembled request into a stream of text
//! chunks. It is the only operation in the system expected to block for a
//! nontrivial duration, so every call carries a bounded deadline and a
//! cooperative cancellation token. A backend may keep producing after
//! cancellation; correctness is enforced upstream by epoch comparison at
//! commit time, never by assuming cancellation is instantaneous.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::GenerationError;

/// A fully-rendered request for the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The rendered, section-delimited prompt
    pub prompt: String,

    /// Temperature (teaching responses run cool)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.3
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: default_temperature(),
            max_tokens: Some(1024),
        }
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationChunk {
    /// Partial content delta
    pub content: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

/// The generation backend trait.
///
/// `deadline` bounds the whole call; implementations should stop producing
/// chunks once `cancel` fires, but callers must tolerate late results.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Start a generation and stream its chunks.
    async fn generate(
        &self,
        request: GenerationRequest,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<GenerationChunk, GenerationError>>,
        GenerationError,
    >;
}
