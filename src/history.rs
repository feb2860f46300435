//! Query history
//!
//! One entry per submitted query. The in-memory list changes first; the
//! write to the [`HistoryStore`] follows and is not reconciled on failure.

use async_trait::async_trait;

use crate::{Error, Result};

/// Persistence boundary for the user's history and session
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one entry
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    async fn append_history(&self, entry: &str) -> Result<()>;

    /// Replace the whole list
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    async fn replace_history(&self, history: &[String]) -> Result<()>;

    /// End the authenticated session
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn logout(&self) -> Result<()>;
}

/// In-memory copy of the history list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    entries: Vec<String>,
}

impl HistoryLog {
    /// Start from a previously persisted list
    #[must_use]
    pub const fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Append an entry
    pub fn append(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// Remove the entry at `index`, keeping the others in order
    ///
    /// # Errors
    ///
    /// Returns `Error::HistoryIndex` if `index` is out of range
    pub fn remove(&mut self, index: usize) -> Result<String> {
        if index >= self.entries.len() {
            return Err(Error::HistoryIndex {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.entries.remove(index))
    }

    /// Entries, oldest first
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
