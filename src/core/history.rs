//! Processed-item history.
//!
//! The history file is a newline-separated list of item ids. It is read
//! once at the start of a poll cycle and replaced wholesale at the end,
//! through a temp file in the same directory followed by a rename.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::ItemId;

use super::error::HistoryError;

/// Ordered set of item ids that have already been picked up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    order: Vec<ItemId>,
    seen: HashSet<ItemId>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[ItemId] {
        &self.order
    }

    /// Append an id if not already present; returns whether it was new
    pub fn insert(&mut self, id: ItemId) -> bool {
        if self.seen.insert(id.clone()) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    /// Union `discovered` into the history.
    ///
    /// Returns the ids that were not present before, in discovery order and
    /// without duplicates. Existing ids keep their position.
    pub fn merge<'a>(&mut self, discovered: impl IntoIterator<Item = &'a ItemId>) -> Vec<ItemId> {
        discovered
            .into_iter()
            .filter(|id| self.insert((*id).clone()))
            .cloned()
            .collect()
    }

    fn to_file_contents(&self) -> String {
        let mut out = String::new();
        for id in &self.order {
            out.push_str(id.as_str());
            out.push('\n');
        }
        out
    }
}

impl FromIterator<ItemId> for History {
    fn from_iter<I: IntoIterator<Item = ItemId>>(iter: I) -> Self {
        let mut history = History::new();
        for id in iter {
            history.insert(id);
        }
        history
    }
}

/// File-backed history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the history; a missing file is an empty history
    pub async fn load(&self) -> Result<History, HistoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No history file yet");
                return Ok(History::new());
            }
            Err(source) => {
                return Err(HistoryError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ItemId::new)
            .collect())
    }

    /// Atomically replace the history file with `history`
    pub async fn commit(&self, history: &History) -> Result<(), HistoryError> {
        let path = self.path.clone();
        let contents = history.to_file_contents();

        tokio::task::spawn_blocking(move || write_atomically(&path, contents.as_bytes()))
            .await
            .map_err(|e| HistoryError::Write {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })??;

        debug!(path = %self.path.display(), entries = history.len(), "History committed");
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), HistoryError> {
    let write_err = |source| HistoryError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
