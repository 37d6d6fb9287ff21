//! Sync-related domain models and configuration.
//!
//! Contains the application configuration and the records kept in the
//! per-target sync history.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::remote::{RemoteKind, TargetKey};

/// Tuning for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Entries kept per target in the sync history.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,

    /// Ceiling for a single HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pause before the one automatic retry of a transport failure.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_log_entries: default_max_log_entries(),
            request_timeout_secs: default_request_timeout(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

const fn default_max_log_entries() -> usize {
    50
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_retry_backoff() -> u64 {
    1000
}

/// Remote endpoint settings shared by all targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    #[serde(default = "default_gitee_api_url")]
    pub gitee_api_url: String,

    /// File name of the snapshot inside a gist.
    #[serde(default = "default_snapshot_file_name")]
    pub snapshot_file_name: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            github_api_url: default_github_api_url(),
            gitee_api_url: default_gitee_api_url(),
            snapshot_file_name: default_snapshot_file_name(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_gitee_api_url() -> String {
    "https://gitee.com/api/v5".into()
}

fn default_snapshot_file_name() -> String {
    "tabsync-data.json".into()
}

fn default_user_agent() -> String {
    concat!("tabsync/", env!("CARGO_PKG_VERSION")).into()
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tabsync")
    }

    /// Get the storage database path.
    #[must_use]
    pub fn storage_db_path(&self) -> PathBuf {
        self.data_dir().join("storage.db")
    }
}

/// Direction of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
}

impl SyncDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            _ => Err(format!("Unknown direction: {s}")),
        }
    }
}

/// Terminal state of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    Conflict,
    Error,
}

impl SyncOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "conflict" => Ok(Self::Conflict),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown outcome: {s}")),
        }
    }
}

/// One line of a target's sync history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResultEntry {
    pub kind: RemoteKind,
    pub target_id: String,
    pub direction: SyncDirection,
    pub outcome: SyncOutcome,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SyncResultEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(
        target: &TargetKey,
        direction: SyncDirection,
        outcome: SyncOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: target.kind,
            target_id: target.id.clone(),
            direction,
            outcome,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.kind, self.target_id.clone())
    }
}
