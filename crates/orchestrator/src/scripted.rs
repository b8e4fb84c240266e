//! Scripted generation backend — deterministic responses for tests and the
//! demo CLI.
//!
//! Steps are consumed in push order; once the script is exhausted the
//! default response repeats. `ignoring_cancel()` produces a backend that
//! keeps generating after its token fires, which is exactly the "late
//! result" shape the epoch check exists to discard.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use mentora_core::error::GenerationError;
use mentora_core::generation::{GenerationChunk, GenerationPort, GenerationRequest};

#[derive(Debug, Clone)]
struct ScriptedResponse {
    chunks: Vec<String>,
    delay: Duration,
}

#[derive(Debug, Clone)]
enum Step {
    Respond(ScriptedResponse),
    Fail(GenerationError),
}

/// A generation port that replays a script.
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    default_response: ScriptedResponse,
    honor_cancel: bool,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            default_response: ScriptedResponse {
                chunks: vec![
                    "Walk me through your thinking so far — ".into(),
                    "what should happen first?".into(),
                ],
                delay: Duration::ZERO,
            },
            honor_cancel: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a chunked response emitted after `delay`.
    pub fn push_response(self, chunks: Vec<&str>, delay: Duration) -> Self {
        self.steps
            .lock()
            .expect("script lock poisoned")
            .push_back(Step::Respond(ScriptedResponse {
                chunks: chunks.into_iter().map(String::from).collect(),
                delay,
            }));
        self
    }

    /// Queue a call-level failure.
    pub fn push_failure(self, error: GenerationError) -> Self {
        self.steps
            .lock()
            .expect("script lock poisoned")
            .push_back(Step::Fail(error));
        self
    }

    /// Replace the default response used once the script runs dry.
    pub fn with_default_text(mut self, text: &str, delay: Duration) -> Self {
        self.default_response = ScriptedResponse {
            chunks: vec![text.to_string()],
            delay,
        };
        self
    }

    /// Keep generating even after the cancellation token fires.
    pub fn ignoring_cancel(mut self) -> Self {
        self.honor_cancel = false;
        self
    }

    /// How many times `generate` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationPort for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
        _deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<GenerationChunk, GenerationError>>,
        GenerationError,
    > {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = self
            .steps
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Step::Respond(self.default_response.clone()));

        let response = match step {
            Step::Fail(error) => return Err(error),
            Step::Respond(response) => response,
        };

        let honor_cancel = self.honor_cancel;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            if honor_cancel {
                tokio::select! {
                    _ = tokio::time::sleep(response.delay) => {}
                    _ = cancel.cancelled() => {
                        let _ = tx.send(Err(GenerationError::Cancelled)).await;
                        return;
                    }
                }
            } else {
                tokio::time::sleep(response.delay).await;
            }

            for chunk in response.chunks {
                if honor_cancel && cancel.is_cancelled() {
                    let _ = tx.send(Err(GenerationError::Cancelled)).await;
                    return;
                }
                if tx
                    .send(Ok(GenerationChunk {
                        content: chunk,
                        done: false,
                    }))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = tx
                .send(Ok(GenerationChunk {
                    content: String::new(),
                    done: true,
                }))
                .await;
        });

        Ok(rx)
    }
}
