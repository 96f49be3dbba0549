//! File-backed seen set.
//!
//! On-disk format is a small JSON document:
//!
//! ```json
//! {"version":1,"ids":["2412.01234","2412.05678"]}
//! ```
//!
//! A plain list with one id per line is also accepted on load, which makes
//! hand-seeding the store easy. The file is always rewritten as JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{PersistenceError, SeenStore};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SeenFile {
    version: u32,
    ids: Vec<String>,
}

/// Seen set persisted to a single file with write-through commits.
#[derive(Debug)]
pub struct FileSeenStore {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl FileSeenStore {
    /// Load the store from `path`; a missing file is an empty set.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let ids = match fs::read_to_string(&path) {
            Ok(content) => parse_content(&path, &content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };

        tracing::info!("Loaded {} seen ids from {}", ids.len(), path.display());
        Ok(Self { path, ids })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `ids` to a sibling temp file, fsync, then rename over the target
    fn write_atomic(&self, ids: &BTreeSet<String>) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source: io::Error| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(io_err)?;

        let document = SeenFile {
            version: FORMAT_VERSION,
            ids: ids.iter().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        Ok(())
    }
}

impl SeenStore for FileSeenStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn commit(&mut self, ids: &[String]) -> Result<(), PersistenceError> {
        if ids.iter().all(|id| self.ids.contains(id)) {
            return Ok(());
        }

        let mut next = self.ids.clone();
        next.extend(ids.iter().cloned());
        self.write_atomic(&next)?;
        self.ids = next;

        tracing::debug!(
            "Committed {} id(s) to {} ({} total)",
            ids.len(),
            self.path.display(),
            self.ids.len()
        );
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

fn parse_content(path: &Path, content: &str) -> Result<BTreeSet<String>, PersistenceError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(BTreeSet::new());
    }

    if trimmed.starts_with('{') {
        let document: SeenFile =
            serde_json::from_str(trimmed).map_err(|e| PersistenceError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if document.version != FORMAT_VERSION {
            return Err(PersistenceError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported version {}", document.version),
            });
        }
        return Ok(document.ids.into_iter().collect());
    }

    if trimmed.starts_with('[') {
        return Err(PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason: "expected an object with an \"ids\" field".to_string(),
        });
    }

    Ok(trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
