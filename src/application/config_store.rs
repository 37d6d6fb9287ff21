//! Durable, keyed configuration of sync targets.
//!
//! The full target set is written in one transaction on every mutation, and
//! the in-memory copy is swapped only after that write commits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::domain::{RemoteBackend, RemoteKind, RemoteTargetConfig, Result, TargetKey};
use crate::infrastructure::LocalStorage;

use super::result_log::{ClearScope, SyncResultLog};

pub struct RemoteConfigStore {
    storage: Arc<LocalStorage>,
    results: Arc<SyncResultLog>,
    targets: Mutex<Vec<RemoteTargetConfig>>,
}

impl RemoteConfigStore {
    /// Load the persisted target set.
    ///
    /// # Errors
    /// Returns error if the targets cannot be read.
    pub fn load(storage: Arc<LocalStorage>, results: Arc<SyncResultLog>) -> Result<Self> {
        let targets = storage.load_targets()?;
        Ok(Self {
            storage,
            results,
            targets: Mutex::new(targets),
        })
    }

    fn targets(&self) -> MutexGuard<'_, Vec<RemoteTargetConfig>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy of the set, persist it, then publish it.
    fn mutate<R>(&self, change: impl FnOnce(&mut Vec<RemoteTargetConfig>) -> R) -> Result<R> {
        let mut targets = self.targets();
        let mut next = targets.clone();
        let result = change(&mut next);
        self.storage.save_targets(&next)?;
        *targets = next;
        Ok(result)
    }

    /// All targets of `kind`, in insertion order.
    #[must_use]
    pub fn get_all(&self, kind: RemoteKind) -> Vec<RemoteTargetConfig> {
        self.targets()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get_config_item(&self, kind: RemoteKind, id: &str) -> Option<RemoteTargetConfig> {
        self.targets()
            .iter()
            .find(|t| t.kind() == kind && t.id == id)
            .cloned()
    }

    /// Enabled targets: gist first, then webdav, each in insertion order.
    #[must_use]
    pub fn enabled_targets(&self) -> Vec<RemoteTargetConfig> {
        let targets = self.targets();
        RemoteKind::ALL
            .iter()
            .flat_map(|kind| {
                targets
                    .iter()
                    .filter(move |t| t.enabled && t.kind() == *kind)
                    .cloned()
            })
            .collect()
    }

    /// Insert a target or replace the one with the same (kind, id).
    ///
    /// Replacing a target that still points at the same remote snapshot keeps
    /// its revision token and last sync time, even when credentials change.
    ///
    /// # Errors
    /// Returns a validation error for missing credentials, or a storage error.
    pub fn upsert(&self, mut config: RemoteTargetConfig) -> Result<()> {
        config.validate()?;
        let key = config.key();

        self.mutate(|targets| {
            if let Some(existing) = targets.iter_mut().find(|t| t.key() == key) {
                if config.revision.is_none() && existing.backend.same_endpoint(&config.backend) {
                    config.revision = existing.revision.take();
                    config.last_synced_at = existing.last_synced_at;
                }
                *existing = config;
            } else {
                targets.push(config);
            }
        })?;

        tracing::info!(target = %key, "Saved sync target");
        Ok(())
    }

    /// Remove a target together with its sync history.
    ///
    /// # Errors
    /// Returns error if the change cannot be persisted.
    pub fn remove(&self, kind: RemoteKind, id: &str) -> Result<bool> {
        let key = TargetKey::new(kind, id);
        let removed = self.mutate(|targets| {
            let before = targets.len();
            targets.retain(|t| t.key() != key);
            targets.len() < before
        })?;

        if removed {
            self.results.clear(&ClearScope::Target(key.clone()))?;
            tracing::info!(target = %key, "Removed sync target");
        }

        Ok(removed)
    }

    /// Store the outcome of a successful sync on the target.
    ///
    /// # Errors
    /// Returns error if the change cannot be persisted.
    pub fn record_sync(
        &self,
        key: &TargetKey,
        revision: Option<String>,
        gist_id: Option<String>,
    ) -> Result<()> {
        self.mutate(|targets| {
            if let Some(target) = targets.iter_mut().find(|t| t.key() == *key) {
                target.revision = revision;
                target.last_synced_at = Some(Utc::now());
                if let (Some(new_id), RemoteBackend::Gist { gist_id, .. }) =
                    (gist_id, &mut target.backend)
                {
                    *gist_id = Some(new_id);
                }
            }
        })
    }
}
