//! In-memory seen set for tests and dry runs.

use std::collections::BTreeSet;

use super::{PersistenceError, SeenStore};

/// Seen set that lives only in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySeenStore {
    ids: BTreeSet<String>,
    fail_commits: bool,
    commits: usize,
}

impl MemorySeenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with `ids`
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Make every following commit fail with [`PersistenceError::Unavailable`]
    pub fn fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Number of successful commit calls
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl SeenStore for MemorySeenStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn commit(&mut self, ids: &[String]) -> Result<(), PersistenceError> {
        if self.fail_commits {
            return Err(PersistenceError::Unavailable("commit failure injected".to_string()));
        }
        self.ids.extend(ids.iter().cloned());
        self.commits += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}
