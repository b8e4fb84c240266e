//! Storage port backends.
//!
//! Both backends share one [`state::StoreState`] document guarded by a
//! single `RwLock`, which is what makes [`commit_interaction`] atomic: the
//! interaction's terminal state, the screen progress, and the memory
//! mutation land under one write guard (and, for the file backend, one
//! flush).
//!
//! [`commit_interaction`]: mentora_core::storage::StoragePort::commit_interaction

pub mod in_memory;
pub mod json_file;

pub(crate) mod state;

pub use in_memory::MemoryStore;
pub use json_file::JsonFileStore;
