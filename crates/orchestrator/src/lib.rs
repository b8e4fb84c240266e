//! Session orchestration — the teaching-interaction pipeline.
//!
//! This crate composes the constraint engine, prompt assembler, response
//! validator, and the ports into the public session operations. The two
//! correctness mechanisms live here:
//!
//! - **Per-session linearization**: every state mutation for a session runs
//!   under that session's keyed lock; cross-session work shares nothing.
//! - **Generation epochs**: each admitted submission gets a monotonically
//!   increasing epoch. A later submission cancels the earlier one
//!   cooperatively, and any result carrying a stale epoch is discarded at
//!   commit time — even if the cancellation signal arrived too late to stop
//!   the generation itself.

pub mod coordinator;
pub mod generation;
pub mod insights;
pub mod memory_update;
pub mod orchestrator;
pub mod scripted;

mod session_lock;

pub use coordinator::{Admission, InteractionCoordinator};
pub use generation::{GeneratedDraft, GenerationDriver};
pub use insights::DerivedInsights;
pub use orchestrator::{CompletionOutcome, Hint, OrchestratorConfig, SessionOrchestrator};
pub use scripted::ScriptedGenerator;
