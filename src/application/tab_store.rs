//! The local tab document and its revision counter.
//!
//! Every write, local edit or pulled snapshot, goes through this store and
//! bumps the revision, which is how a pull detects a concurrent local edit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::domain::{Result, TabGroupDocument};
use crate::infrastructure::LocalStorage;

/// A document together with the local revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedDocument {
    pub revision: u64,
    pub document: TabGroupDocument,
}

pub struct TabDataStore {
    storage: Arc<LocalStorage>,
    state: Mutex<VersionedDocument>,
}

impl TabDataStore {
    /// Load the stored document, or start from an empty one.
    ///
    /// # Errors
    /// Returns error if the stored document cannot be read or parsed.
    pub fn load(storage: Arc<LocalStorage>) -> Result<Self> {
        let state = storage.load_document()?.map_or_else(
            || VersionedDocument {
                revision: 0,
                document: TabGroupDocument::default(),
            },
            |(revision, document)| VersionedDocument { revision, document },
        );

        Ok(Self {
            storage,
            state: Mutex::new(state),
        })
    }

    fn state(&self) -> MutexGuard<'_, VersionedDocument> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> VersionedDocument {
        self.state().clone()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state().revision
    }

    fn commit(&self, state: &mut VersionedDocument, document: TabGroupDocument) -> Result<u64> {
        let revision = state.revision + 1;
        self.storage.save_document(revision, &document)?;
        *state = VersionedDocument { revision, document };
        Ok(revision)
    }

    /// Apply a local edit. The document is persisted before it becomes visible.
    ///
    /// # Errors
    /// Returns error if the edited document cannot be persisted.
    pub fn edit<R>(&self, change: impl FnOnce(&mut TabGroupDocument) -> R) -> Result<R> {
        let mut state = self.state();
        let mut document = state.document.clone();
        let result = change(&mut document);
        document.last_modified_at = Utc::now();
        self.commit(&mut state, document)?;
        Ok(result)
    }

    /// Replace the document only if nobody wrote since `expected_revision`.
    ///
    /// # Errors
    /// Returns error if the document cannot be persisted.
    pub fn replace_if_unchanged(
        &self,
        expected_revision: u64,
        document: TabGroupDocument,
    ) -> Result<bool> {
        let mut state = self.state();
        if state.revision != expected_revision {
            return Ok(false);
        }
        self.commit(&mut state, document)?;
        Ok(true)
    }

    /// Replace the document unconditionally.
    ///
    /// # Errors
    /// Returns error if the document cannot be persisted.
    pub fn replace(&self, document: TabGroupDocument) -> Result<u64> {
        let mut state = self.state();
        self.commit(&mut state, document)
    }
}
