//! Dedup store: the durable set of already-announced paper ids.
//!
//! The [`SeenStore`] trait is the only way the rest of the crate touches the
//! seen set. Two implementations exist:
//!
//! - [`FileSeenStore`] - loaded once at start, held in memory, and written
//!   through to disk on every commit with an atomic replace.
//! - [`MemorySeenStore`] - in-memory substitute for tests, with optional
//!   failure injection.
//!
//! # Invariant
//!
//! An id becomes visible through [`SeenStore::contains`] only after
//! [`SeenStore::commit`] returned `Ok`. A failed commit leaves both the
//! in-memory set and the file untouched.

mod file;
mod memory;

pub use file::FileSeenStore;
pub use memory::MemorySeenStore;

use std::collections::HashSet;
use std::path::PathBuf;

use crate::models::PaperRecord;

/// Persisted set of paper ids that were successfully announced.
pub trait SeenStore: Send + std::fmt::Debug {
    /// Whether `id` was already announced
    fn contains(&self, id: &str) -> bool;

    /// Durably add `ids` to the set
    fn commit(&mut self, ids: &[String]) -> Result<(), PersistenceError>;

    /// Number of ids in the set
    fn len(&self) -> usize;

    /// Whether the set is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All ids, sorted
    fn ids(&self) -> Vec<String>;

    /// Records whose id is not yet seen, in input order.
    ///
    /// Repeated ids inside the batch are collapsed to their first occurrence.
    fn filter_new(&self, batch: &[PaperRecord]) -> Vec<PaperRecord> {
        let mut in_batch = HashSet::new();
        batch
            .iter()
            .filter(|r| !self.contains(&r.id))
            .filter(|r| in_batch.insert(r.id.as_str()))
            .cloned()
            .collect()
    }
}

/// Errors raised while loading or writing the seen set
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Reading or writing the state file failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but cannot be understood
    #[error("Corrupt seen-id file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Serializing the set failed
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Injected failure (tests) or any other backend failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
