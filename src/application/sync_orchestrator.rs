//! Sync orchestration across configured targets.
//!
//! Every attempt runs under a per-target in-flight guard and ends with exactly
//! one entry in the sync history, including attempts whose future is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::join_all;

use crate::domain::{
    AppError, ErrorKind, PushRequest, RemoteClient, RemoteKind, RemoteTargetConfig, Result,
    SyncDirection, SyncOutcome, SyncResultEntry, TargetKey,
};

use super::config_store::RemoteConfigStore;
use super::result_log::{ClearScope, SyncResultLog};
use super::tab_store::TabDataStore;

/// How to settle a reported conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite the remote with the local document.
    ForcePush,
    /// Replace the local document with the remote snapshot.
    DiscardLocal,
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: RemoteKind,
    pub id: String,
    pub direction: SyncDirection,
    pub outcome: SyncOutcome,
    pub message: String,
    pub revision: Option<String>,
}

/// Per-target line of a push-all run.
#[derive(Debug, Clone)]
pub struct TargetResult {
    pub target: TargetKey,
    pub display_name: String,
    pub outcome: SyncOutcome,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
}

impl TargetResult {
    fn from_result(config: &RemoteTargetConfig, result: Result<SyncReport>) -> Self {
        let (outcome, message, error_kind) = match result {
            Ok(report) => (report.outcome, report.message, None),
            Err(err) => (outcome_for(&err), err.to_string(), Some(err.kind())),
        };
        Self {
            target: config.key(),
            display_name: config.display_name.clone(),
            outcome,
            message,
            error_kind,
        }
    }
}

/// Aggregate of a push-all run, in target order.
#[derive(Debug, Clone, Default)]
pub struct PushAllReport {
    pub results: Vec<TargetResult>,
}

impl PushAllReport {
    fn count(&self, outcome: SyncOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(SyncOutcome::Success)
    }

    #[must_use]
    pub fn conflicts(&self) -> usize {
        self.count(SyncOutcome::Conflict)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.count(SyncOutcome::Error)
    }
}

const fn outcome_for(err: &AppError) -> SyncOutcome {
    match err.kind() {
        ErrorKind::Conflict => SyncOutcome::Conflict,
        _ => SyncOutcome::Error,
    }
}

/// Marks a target busy until dropped. Records an abandoned attempt if the
/// owning future is dropped before `finish` runs.
struct InFlight<'a> {
    orchestrator: &'a SyncOrchestrator,
    key: TargetKey,
    direction: SyncDirection,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, outcome: SyncOutcome, message: &str) {
        self.finished = true;
        self.orchestrator
            .record(&self.key, self.direction, outcome, message);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(target = %self.key, direction = %self.direction, "Sync abandoned");
            self.orchestrator.record(
                &self.key,
                self.direction,
                SyncOutcome::Error,
                "operation abandoned",
            );
        }
        self.orchestrator.in_flight().remove(&self.key);
    }
}

/// Runs push and pull against configured targets.
pub struct SyncOrchestrator {
    configs: Arc<RemoteConfigStore>,
    results: Arc<SyncResultLog>,
    tabs: Arc<TabDataStore>,
    gist: Arc<dyn RemoteClient>,
    webdav: Arc<dyn RemoteClient>,
    in_flight: Mutex<HashSet<TargetKey>>,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(
        configs: Arc<RemoteConfigStore>,
        results: Arc<SyncResultLog>,
        tabs: Arc<TabDataStore>,
        gist: Arc<dyn RemoteClient>,
        webdav: Arc<dyn RemoteClient>,
    ) -> Self {
        Self {
            configs,
            results,
            tabs,
            gist,
            webdav,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<TargetKey>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self, kind: RemoteKind) -> &dyn RemoteClient {
        match kind {
            RemoteKind::Gist => self.gist.as_ref(),
            RemoteKind::WebDav => self.webdav.as_ref(),
        }
    }

    fn begin(&self, key: &TargetKey, direction: SyncDirection) -> Result<InFlight<'_>> {
        if !self.in_flight().insert(key.clone()) {
            return Err(AppError::Busy {
                target: key.to_string(),
            });
        }
        Ok(InFlight {
            orchestrator: self,
            key: key.clone(),
            direction,
            finished: false,
        })
    }

    fn record(&self, key: &TargetKey, direction: SyncDirection, outcome: SyncOutcome, message: &str) {
        let entry = SyncResultEntry::new(key, direction, outcome, message);
        if let Err(err) = self.results.append(entry) {
            tracing::warn!(target = %key, error = %err, "Failed to record sync result");
        }
    }

    /// Push or pull one target, checking the remote revision.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown target, `Busy` if the target is
    /// already syncing, or the normalized remote error. Every error except
    /// those two is also recorded in the target's history.
    pub async fn sync_target(
        &self,
        kind: RemoteKind,
        id: &str,
        direction: SyncDirection,
    ) -> Result<SyncReport> {
        self.run(kind, id, direction, false).await
    }

    /// Settle a conflict by overriding one side.
    ///
    /// # Errors
    /// Same as [`Self::sync_target`], minus conflicts.
    pub async fn resolve_conflict(
        &self,
        kind: RemoteKind,
        id: &str,
        resolution: Resolution,
    ) -> Result<SyncReport> {
        let direction = match resolution {
            Resolution::ForcePush => SyncDirection::Push,
            Resolution::DiscardLocal => SyncDirection::Pull,
        };
        self.run(kind, id, direction, true).await
    }

    async fn run(
        &self,
        kind: RemoteKind,
        id: &str,
        direction: SyncDirection,
        force: bool,
    ) -> Result<SyncReport> {
        let key = TargetKey::new(kind, id);
        let config = self
            .configs
            .get_config_item(kind, id)
            .ok_or_else(|| AppError::not_found(format!("no sync target {key}")))?;

        let guard = self.begin(&key, direction)?;
        let started = Instant::now();

        let result = match direction {
            SyncDirection::Push => self.push(&config, force).await,
            SyncDirection::Pull => self.pull(&config, force).await,
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok((message, revision)) => {
                guard.finish(SyncOutcome::Success, &message);
                tracing::info!(
                    target = %key,
                    direction = %direction,
                    revision = revision.as_deref().unwrap_or("-"),
                    duration_ms,
                    "Sync completed"
                );
                Ok(SyncReport {
                    kind,
                    id: id.to_string(),
                    direction,
                    outcome: SyncOutcome::Success,
                    message,
                    revision,
                })
            }
            Err(err) => {
                let message = match (direction, err.kind()) {
                    (SyncDirection::Pull, ErrorKind::NotFound) => {
                        format!("no snapshot at remote yet: {err}")
                    }
                    _ => err.to_string(),
                };
                guard.finish(outcome_for(&err), &message);
                tracing::warn!(
                    target = %key,
                    direction = %direction,
                    kind = %err.kind(),
                    duration_ms,
                    "Sync failed: {message}"
                );
                Err(err)
            }
        }
    }

    async fn push(
        &self,
        config: &RemoteTargetConfig,
        force: bool,
    ) -> Result<(String, Option<String>)> {
        let local = self.tabs.snapshot();
        let request = PushRequest {
            document: &local.document,
            base_revision: config.revision.as_deref(),
            force,
        };

        let receipt = self.client(config.kind()).push(config, request).await?;
        self.configs
            .record_sync(&config.key(), receipt.revision.clone(), receipt.gist_id)?;

        Ok((format!("Pushed {}", local.document.summary()), receipt.revision))
    }

    async fn pull(
        &self,
        config: &RemoteTargetConfig,
        force: bool,
    ) -> Result<(String, Option<String>)> {
        let seen = self.tabs.revision();
        let remote = self.client(config.kind()).pull(config).await?;
        let summary = remote.document.summary();

        if force {
            self.tabs.replace(remote.document)?;
        } else if !self.tabs.replace_if_unchanged(seen, remote.document)? {
            return Err(AppError::conflict(
                "local tab groups changed while pulling; the pulled snapshot was discarded",
            ));
        }

        self.configs
            .record_sync(&config.key(), remote.revision.clone(), None)?;

        Ok((format!("Pulled {summary}"), remote.revision))
    }

    /// Push the local document to every enabled target concurrently.
    ///
    /// Per-target failures are reported in the result, never raised.
    ///
    /// # Errors
    /// Returns `NoTargets` when no target is enabled.
    pub async fn push_to_all_remotes(&self, force: bool) -> Result<PushAllReport> {
        let targets = self.configs.enabled_targets();
        if targets.is_empty() {
            return Err(AppError::NoTargets);
        }

        let runs = targets.iter().map(|config| async move {
            let result = self
                .run(config.kind(), &config.id, SyncDirection::Push, force)
                .await;
            TargetResult::from_result(config, result)
        });
        let report = PushAllReport {
            results: join_all(runs).await,
        };

        tracing::info!(
            succeeded = report.succeeded(),
            conflicts = report.conflicts(),
            failures = report.failures(),
            "Push to all remotes finished"
        );
        Ok(report)
    }

    /// Clear sync history. Never touches a remote.
    ///
    /// # Errors
    /// Returns error if the deletion cannot be persisted.
    pub fn clear_sync_result(&self, scope: &ClearScope) -> Result<()> {
        self.results.clear(scope)
    }

    /// Add or replace a target.
    ///
    /// # Errors
    /// Returns a validation or storage error.
    pub fn upsert_target(&self, config: RemoteTargetConfig) -> Result<()> {
        self.configs.upsert(config)
    }

    /// Remove a target and its history.
    ///
    /// # Errors
    /// Returns error if the change cannot be persisted.
    pub fn remove_target(&self, kind: RemoteKind, id: &str) -> Result<bool> {
        self.configs.remove(kind, id)
    }

    #[must_use]
    pub fn get_config_item(&self, kind: RemoteKind, id: &str) -> Option<RemoteTargetConfig> {
        self.configs.get_config_item(kind, id)
    }

    #[must_use]
    pub fn get_all(&self, kind: RemoteKind) -> Vec<RemoteTargetConfig> {
        self.configs.get_all(kind)
    }

    #[must_use]
    pub fn sync_results(&self, kind: RemoteKind, id: &str) -> Vec<SyncResultEntry> {
        self.results.get(kind, id)
    }

    #[must_use]
    pub fn last_result(&self, kind: RemoteKind, id: &str) -> Option<SyncResultEntry> {
        self.results.latest(kind, id)
    }

    /// The local tab document store.
    #[must_use]
    pub fn tabs(&self) -> &TabDataStore {
        &self.tabs
    }
}
