//! Bounded per-target history of sync attempts.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{RemoteKind, Result, SyncResultEntry, TargetKey};
use crate::infrastructure::LocalStorage;

/// Which part of the history to clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    Target(TargetKey),
    Kind(RemoteKind),
    All,
}

type Entries = HashMap<TargetKey, VecDeque<SyncResultEntry>>;

/// Sync history, newest entry last, capped at `max_entries` per target.
pub struct SyncResultLog {
    storage: Arc<LocalStorage>,
    max_entries: usize,
    entries: Mutex<Entries>,
}

impl SyncResultLog {
    /// Load the persisted history.
    ///
    /// # Errors
    /// Returns error if the history cannot be read.
    pub fn load(storage: Arc<LocalStorage>, max_entries: usize) -> Result<Self> {
        let max_entries = max_entries.max(1);
        let mut entries = Entries::new();

        for entry in storage.load_results()? {
            let list = entries.entry(entry.key()).or_default();
            list.push_back(entry);
            if list.len() > max_entries {
                list.pop_front();
            }
        }

        Ok(Self {
            storage,
            max_entries,
            entries: Mutex::new(entries),
        })
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an attempt, evicting the target's oldest entry when full.
    ///
    /// # Errors
    /// Returns error if the entry cannot be persisted; memory is left unchanged.
    pub fn append(&self, entry: SyncResultEntry) -> Result<()> {
        let mut entries = self.entries();
        self.storage.append_result(&entry, self.max_entries)?;

        let list = entries.entry(entry.key()).or_default();
        list.push_back(entry);
        while list.len() > self.max_entries {
            list.pop_front();
        }

        Ok(())
    }

    /// Chronological history of one target.
    #[must_use]
    pub fn get(&self, kind: RemoteKind, id: &str) -> Vec<SyncResultEntry> {
        self.entries()
            .get(&TargetKey::new(kind, id))
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent entry of one target.
    #[must_use]
    pub fn latest(&self, kind: RemoteKind, id: &str) -> Option<SyncResultEntry> {
        self.entries()
            .get(&TargetKey::new(kind, id))
            .and_then(|list| list.back().cloned())
    }

    /// Drop history for the given scope.
    ///
    /// # Errors
    /// Returns error if the deletion cannot be persisted.
    pub fn clear(&self, scope: &ClearScope) -> Result<()> {
        let mut entries = self.entries();
        match scope {
            ClearScope::Target(key) => {
                self.storage.clear_results(Some(key.kind), Some(&key.id))?;
                entries.remove(key);
            }
            ClearScope::Kind(kind) => {
                self.storage.clear_results(Some(*kind), None)?;
                entries.retain(|key, _| key.kind != *kind);
            }
            ClearScope::All => {
                self.storage.clear_results(None, None)?;
                entries.clear();
            }
        }
        Ok(())
    }
}
