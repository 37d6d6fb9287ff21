//! Remote target configuration and the client capability interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{AppError, Result};
use super::models::TabGroupDocument;

/// Backend kind of a sync target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    Gist,
    #[serde(rename = "webdav")]
    WebDav,
}

impl RemoteKind {
    /// Push order used by `push_to_all_remotes`.
    pub const ALL: [Self; 2] = [Self::Gist, Self::WebDav];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gist => "gist",
            Self::WebDav => "webdav",
        }
    }
}

impl std::fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RemoteKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gist" => Ok(Self::Gist),
            "webdav" | "dav" => Ok(Self::WebDav),
            _ => Err(format!("Unknown target kind: {s}. Use: gist, webdav")),
        }
    }
}

/// Identity of a sync target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub kind: RemoteKind,
    pub id: String,
}

impl TargetKey {
    pub fn new(kind: RemoteKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Which gist service a gist target talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GistProvider {
    #[default]
    Github,
    Gitee,
}

impl std::str::FromStr for GistProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "gitee" => Ok(Self::Gitee),
            _ => Err(format!("Unknown gist provider: {s}. Use: github, gitee")),
        }
    }
}

impl std::fmt::Display for GistProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Github => f.write_str("github"),
            Self::Gitee => f.write_str("gitee"),
        }
    }
}

/// Kind-specific connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteBackend {
    Gist {
        #[serde(default)]
        provider: GistProvider,
        access_token: String,
        /// Assigned by the provider on the first push when absent.
        #[serde(default)]
        gist_id: Option<String>,
    },
    #[serde(rename = "webdav")]
    WebDav {
        base_url: String,
        username: String,
        password: String,
        remote_path: String,
    },
}

impl RemoteBackend {
    /// Whether both settings address the same remote snapshot, ignoring credentials.
    #[must_use]
    pub fn same_endpoint(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Gist {
                    provider: a_provider,
                    gist_id: a_gist,
                    ..
                },
                Self::Gist {
                    provider: b_provider,
                    gist_id: b_gist,
                    ..
                },
            ) => a_provider == b_provider && a_gist == b_gist,
            (
                Self::WebDav {
                    base_url: a_url,
                    remote_path: a_path,
                    ..
                },
                Self::WebDav {
                    base_url: b_url,
                    remote_path: b_path,
                    ..
                },
            ) => {
                a_url.trim_end_matches('/') == b_url.trim_end_matches('/')
                    && a_path.trim_matches('/') == b_path.trim_matches('/')
            }
            _ => false,
        }
    }
}

/// One configured sync destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTargetConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Last known remote revision token (ETag or native revision id).
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub backend: RemoteBackend,
}

const fn default_enabled() -> bool {
    true
}

impl RemoteTargetConfig {
    pub fn gist(
        id: impl Into<String>,
        provider: GistProvider,
        access_token: impl Into<String>,
        gist_id: Option<String>,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            enabled: true,
            revision: None,
            last_synced_at: None,
            backend: RemoteBackend::Gist {
                provider,
                access_token: access_token.into(),
                gist_id,
            },
        }
    }

    pub fn webdav(
        id: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            enabled: true,
            revision: None,
            last_synced_at: None,
            backend: RemoteBackend::WebDav {
                base_url: base_url.into(),
                username: username.into(),
                password: password.into(),
                remote_path: remote_path.into(),
            },
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub const fn kind(&self) -> RemoteKind {
        match self.backend {
            RemoteBackend::Gist { .. } => RemoteKind::Gist,
            RemoteBackend::WebDav { .. } => RemoteKind::WebDav,
        }
    }

    #[must_use]
    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.kind(), self.id.clone())
    }

    /// Check that every required credential field is present.
    ///
    /// # Errors
    /// Returns a validation error naming the first missing or malformed field.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("target id must not be empty"));
        }

        match &self.backend {
            RemoteBackend::Gist { access_token, gist_id, .. } => {
                require("access_token", access_token)?;
                if let Some(gist_id) = gist_id {
                    require("gist_id", gist_id)?;
                }
            }
            RemoteBackend::WebDav {
                base_url,
                username,
                password,
                remote_path,
            } => {
                require("base_url", base_url)?;
                require("username", username)?;
                require("password", password)?;
                require("remote_path", remote_path)?;

                let url = reqwest::Url::parse(base_url).map_err(|e| {
                    AppError::validation(format!("base_url is not a valid URL: {e}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(AppError::validation("base_url must use http or https"));
                }
            }
        }

        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(AppError::validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// A snapshot fetched from a target.
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
    pub document: TabGroupDocument,
    pub revision: Option<String>,
}

/// A write request against a target.
#[derive(Debug, Clone, Copy)]
pub struct PushRequest<'a> {
    pub document: &'a TabGroupDocument,
    /// Revision the local side last saw. `None` means no check is possible.
    pub base_revision: Option<&'a str>,
    /// Skip the optimistic-concurrency check.
    pub force: bool,
}

/// Outcome of a successful push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReceipt {
    pub revision: Option<String>,
    /// Gist id assigned when the push created a new gist.
    pub gist_id: Option<String>,
}

/// Capability-uniform adapter for one backend kind.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch the remote snapshot.
    async fn pull(&self, config: &RemoteTargetConfig) -> Result<RemoteSnapshot>;

    /// Replace the remote snapshot with `request.document`.
    async fn push(&self, config: &RemoteTargetConfig, request: PushRequest<'_>)
        -> Result<PushReceipt>;
}
