//! # Mentora Core
//!
//! Domain types, traits, and error definitions for the Mentora lesson
//! orchestration runtime. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (storage, text generation) is defined as a
//! trait here. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod clock;
pub mod error;
pub mod event;
pub mod generation;
pub mod interaction;
pub mod learner;
pub mod profile;
pub mod screen;
pub mod session;
pub mod validation;

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, GenerationError, Result, SessionError, StorageError};
pub use event::{DomainEvent, EventBus, InteractionEvent};
pub use generation::{GenerationChunk, GenerationPort, GenerationRequest};
pub use interaction::{Interaction, InteractionId, InteractionState};
pub use learner::{ConceptMastery, LearnerMemory, Misconception, ProgressMarker};
pub use profile::{InstructorProfile, ProfileId, ProfileSnapshot, TeachingStyle, Verbosity};
pub use screen::{
    ConstraintKind, ConstraintViolation, ScreenConstraints, ScreenFlags, ScreenId, ScreenPhase,
    ScreenProgress, ScreenState, ScreenType,
};
pub use session::{LearnerId, Session, SessionId, SessionState};
pub use validation::{Severity, ValidationAction, ValidationResult, Violation};

/// Storage port — abstract persistence for all durable state.
pub mod storage;
pub use storage::StoragePort;
