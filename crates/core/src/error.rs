//! Error types for the Mentora domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::screen::ConstraintViolation;

/// The top-level error type for all Mentora operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Session / screen lifecycle errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Constraint rejections (pre-generation) ---
    #[error("Constraint violated: {0}")]
    Constraint(#[from] ConstraintViolation),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures surfaced by the storage port. All variants are retryable from
/// the caller's perspective; no partial commit is ever observable.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

/// Failures surfaced by the generation port.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Request timed out after {deadline_secs}s")]
    Timeout { deadline_secs: u64 },

    #[error("Backend overloaded: {0}")]
    Overloaded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl GenerationError {
    /// Whether a retry with backoff is worth attempting.
    ///
    /// Timeouts, overload, network blips, and mid-stream interruptions are
    /// transient; auth and configuration failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Overloaded(_)
                | Self::Network(_)
                | Self::StreamInterrupted(_)
        )
    }
}

/// Lifecycle errors for session and screen operations.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Session '{0}' is not active")]
    SessionNotActive(String),

    #[error("Screen '{0}' is locked")]
    ScreenLocked(String),

    #[error("Screen '{0}' is already active")]
    AlreadyActive(String),

    #[error("Screen '{0}' is not active")]
    ScreenNotActive(String),

    #[error("No hints remaining on screen '{0}'")]
    NoHintsRemaining(String),

    #[error("Completion requirements not met: {0}")]
    RequirementsNotMet(String),

    #[error("Illegal interaction transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Screen '{screen}' does not belong to session '{session}'")]
    ScreenSessionMismatch { screen: String, session: String },
}
