//! Gist backend (GitHub and Gitee).
//!
//! The snapshot is a single file inside a secret gist. The gist's native
//! history version is the revision token.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::domain::sync::RemoteConfig;
use crate::domain::{
    AppError, GistProvider, PushReceipt, PushRequest, RemoteBackend, RemoteClient,
    RemoteSnapshot, RemoteTargetConfig, Result, TabGroupDocument,
};

use super::http::{classify_status, request_error, with_retry};

const GIST_DESCRIPTION: &str = "tabsync tab groups";

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    files: HashMap<String, GistFile>,
    #[serde(default)]
    history: Vec<GistHistory>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl GistResponse {
    fn revision(&self) -> Option<String> {
        self.history
            .first()
            .map(|h| h.version.clone())
            .or_else(|| self.updated_at.clone())
    }
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistHistory {
    version: String,
}

/// Borrowed view of a gist target's credentials.
struct GistAccess<'a> {
    provider: GistProvider,
    token: &'a str,
    gist_id: Option<&'a str>,
}

impl<'a> GistAccess<'a> {
    fn from_config(config: &'a RemoteTargetConfig) -> Result<Self> {
        match &config.backend {
            RemoteBackend::Gist {
                provider,
                access_token,
                gist_id,
            } => Ok(Self {
                provider: *provider,
                token: access_token,
                gist_id: gist_id.as_deref(),
            }),
            RemoteBackend::WebDav { .. } => Err(AppError::validation(format!(
                "target {} is not a gist target",
                config.id
            ))),
        }
    }
}

/// Remote client for gist targets.
pub struct GistClient {
    http: reqwest::Client,
    github_api_url: String,
    gitee_api_url: String,
    file_name: String,
    retry_backoff: Duration,
}

impl GistClient {
    #[must_use]
    pub fn new(http: reqwest::Client, remote: &RemoteConfig, retry_backoff: Duration) -> Self {
        Self {
            http,
            github_api_url: remote.github_api_url.trim_end_matches('/').to_string(),
            gitee_api_url: remote.gitee_api_url.trim_end_matches('/').to_string(),
            file_name: remote.snapshot_file_name.clone(),
            retry_backoff,
        }
    }

    fn request(&self, method: Method, access: &GistAccess<'_>, path: &str) -> RequestBuilder {
        match access.provider {
            GistProvider::Github => self
                .http
                .request(method, format!("{}{path}", self.github_api_url))
                .bearer_auth(access.token)
                .header(header::ACCEPT, "application/vnd.github+json"),
            GistProvider::Gitee => self
                .http
                .request(method, format!("{}{path}", self.gitee_api_url))
                .query(&[("access_token", access.token)]),
        }
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder, context: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| request_error(context, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, context));
        }

        let body = response
            .text()
            .await
            .map_err(|e| request_error(context, e))?;
        serde_json::from_str(&body).map_err(|e| AppError::Format {
            message: format!("{context}: unexpected response body: {e}"),
            source: Some(e),
        })
    }

    async fn fetch_gist(&self, access: &GistAccess<'_>, gist_id: &str) -> Result<GistResponse> {
        with_retry(self.retry_backoff, "fetch gist", || {
            let request = self.request(Method::GET, access, &format!("/gists/{gist_id}"));
            Self::send_json(request, "fetch gist")
        })
        .await
    }

    /// Read a gist file's content, following `raw_url` for truncated files.
    async fn file_content(&self, file: &GistFile) -> Result<String> {
        match (&file.content, file.truncated, &file.raw_url) {
            (Some(content), false, _) => Ok(content.clone()),
            (_, _, Some(raw_url)) => {
                with_retry(self.retry_backoff, "fetch raw gist file", || async move {
                    let response = self
                        .http
                        .get(raw_url)
                        .send()
                        .await
                        .map_err(|e| request_error("fetch raw gist file", e))?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(classify_status(status, "fetch raw gist file"));
                    }
                    response
                        .text()
                        .await
                        .map_err(|e| request_error("fetch raw gist file", e))
                })
                .await
            }
            _ => Err(AppError::format("gist file has no readable content")),
        }
    }

    async fn create_gist(&self, access: &GistAccess<'_>, content: &str) -> Result<PushReceipt> {
        let file_name = self.file_name.as_str();
        let body = json!({
            "description": GIST_DESCRIPTION,
            "public": false,
            "files": { file_name: { "content": content } },
        });

        // Creation is not idempotent, so a failed POST is not retried.
        let request = self.request(Method::POST, access, "/gists").json(&body);
        let created: GistResponse = Self::send_json(request, "create gist").await?;

        tracing::info!(gist_id = %created.id, "Created gist for snapshot");

        Ok(PushReceipt {
            revision: created.revision(),
            gist_id: Some(created.id),
        })
    }

    async fn update_gist(
        &self,
        access: &GistAccess<'_>,
        gist_id: &str,
        content: &str,
    ) -> Result<PushReceipt> {
        let file_name = self.file_name.as_str();
        let body = json!({
            "description": GIST_DESCRIPTION,
            "files": { file_name: { "content": content } },
        });

        let updated: GistResponse = with_retry(self.retry_backoff, "update gist", || {
            let request = self
                .request(Method::PATCH, access, &format!("/gists/{gist_id}"))
                .json(&body);
            Self::send_json(request, "update gist")
        })
        .await?;

        Ok(PushReceipt {
            revision: updated.revision(),
            gist_id: None,
        })
    }
}

#[async_trait]
impl RemoteClient for GistClient {
    async fn pull(&self, config: &RemoteTargetConfig) -> Result<RemoteSnapshot> {
        let access = GistAccess::from_config(config)?;
        let Some(gist_id) = access.gist_id else {
            return Err(AppError::not_found(format!(
                "no gist has been created for target {} yet",
                config.id
            )));
        };

        let gist = self.fetch_gist(&access, gist_id).await?;
        let file = gist.files.get(&self.file_name).ok_or_else(|| {
            AppError::not_found(format!("gist {gist_id} has no file {}", self.file_name))
        })?;

        let content = self.file_content(file).await?;
        let document = TabGroupDocument::from_json(&content)?;

        tracing::debug!(gist_id, revision = ?gist.revision(), "Fetched gist snapshot");

        Ok(RemoteSnapshot {
            document,
            revision: gist.revision(),
        })
    }

    async fn push(
        &self,
        config: &RemoteTargetConfig,
        request: PushRequest<'_>,
    ) -> Result<PushReceipt> {
        let access = GistAccess::from_config(config)?;
        let content = request.document.to_json()?;

        let Some(gist_id) = access.gist_id else {
            return self.create_gist(&access, &content).await;
        };

        if !request.force {
            if let Some(base) = request.base_revision {
                let current = self.fetch_gist(&access, gist_id).await?;
                let remote_revision = current.revision();
                if current.files.contains_key(&self.file_name)
                    && remote_revision.as_deref() != Some(base)
                {
                    return Err(AppError::conflict(format!(
                        "gist {gist_id} changed remotely (expected revision {base}, found {})",
                        remote_revision.as_deref().unwrap_or("none")
                    )));
                }
            }
        }

        self.update_gist(&access, gist_id, &content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TabEntry, TabGroup};
    use httpmock::Method::{GET, PATCH, POST};
    use httpmock::MockServer;

    fn client_for(server: &MockServer) -> GistClient {
        let remote = RemoteConfig {
            github_api_url: server.base_url(),
            gitee_api_url: format!("{}/api/v5", server.base_url()),
            ..RemoteConfig::default()
        };
        GistClient::new(reqwest::Client::new(), &remote, Duration::from_millis(1))
    }

    fn document() -> TabGroupDocument {
        TabGroupDocument::new(vec![TabGroup::new("Work")
            .with_tabs(vec![TabEntry::new("https://github.com", "GitHub")])])
    }

    fn gist_body(doc: &TabGroupDocument, version: &str) -> serde_json::Value {
        json!({
            "id": "abc",
            "files": {
                "tabsync-data.json": {
                    "content": doc.to_json().unwrap(),
                    "truncated": false
                }
            },
            "history": [{ "version": version }]
        })
    }

    #[tokio::test]
    async fn test_pull_without_gist_id_is_not_found() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", None);

        let err = client.pull(&config).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_pull_reads_document_and_revision() {
        let server = MockServer::start_async().await;
        let doc = document();
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/gists/abc")
                    .header("authorization", "Bearer tok");
                then.status(200).json_body(gist_body(&doc, "rev-1"));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", Some("abc".into()));
        let snapshot = client.pull(&config).await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.document, doc);
        assert_eq!(snapshot.revision.as_deref(), Some("rev-1"));
    }

    #[tokio::test]
    async fn test_pull_follows_raw_url_for_truncated_file() {
        let server = MockServer::start_async().await;
        let doc = document();
        let json = doc.to_json().unwrap();
        let gist = server
            .mock_async(|when, then| {
                when.method(GET).path("/gists/abc");
                then.status(200).json_body(json!({
                    "id": "abc",
                    "files": {
                        "tabsync-data.json": {
                            "content": &json[..10],
                            "truncated": true,
                            "raw_url": server.url("/raw/abc/tabsync-data.json")
                        }
                    },
                    "history": [{ "version": "rev-7" }]
                }));
            })
            .await;
        let raw = server
            .mock_async(|when, then| {
                when.method(GET).path("/raw/abc/tabsync-data.json");
                then.status(200).body(&json);
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", Some("abc".into()));
        let snapshot = client.pull(&config).await.unwrap();

        gist.assert_async().await;
        raw.assert_async().await;
        assert_eq!(snapshot.document, doc);
        assert_eq!(snapshot.revision.as_deref(), Some("rev-7"));
    }

    #[tokio::test]
    async fn test_pull_missing_file_is_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gists/abc");
                then.status(200)
                    .json_body(json!({ "id": "abc", "files": {}, "history": [] }));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", Some("abc".into()));

        assert!(matches!(
            client.pull(&config).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_token_is_auth_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gists/abc");
                then.status(401).json_body(json!({ "message": "Bad credentials" }));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "bad", Some("abc".into()));

        assert!(matches!(client.pull(&config).await, Err(AppError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_gitee_sends_token_as_query_param() {
        let server = MockServer::start_async().await;
        let doc = document();
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v5/gists/abc")
                    .query_param("access_token", "tok");
                then.status(200).json_body(gist_body(&doc, "g-1"));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("cn", GistProvider::Gitee, "tok", Some("abc".into()));
        client.pull(&config).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_without_gist_id_creates_gist() {
        let server = MockServer::start_async().await;
        let doc = document();
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/gists")
                    .body_contains("tabsync-data.json");
                then.status(201).json_body(gist_body(&doc, "rev-new"));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", None);
        let receipt = client
            .push(
                &config,
                PushRequest {
                    document: &doc,
                    base_revision: None,
                    force: false,
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(receipt.gist_id.as_deref(), Some("abc"));
        assert_eq!(receipt.revision.as_deref(), Some("rev-new"));
    }

    #[tokio::test]
    async fn test_push_with_stale_revision_conflicts_without_writing() {
        let server = MockServer::start_async().await;
        let doc = document();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gists/abc");
                then.status(200).json_body(gist_body(&doc, "rev-2"));
            })
            .await;
        let patch = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/gists/abc");
                then.status(200).json_body(gist_body(&doc, "rev-3"));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", Some("abc".into()));
        let err = client
            .push(
                &config,
                PushRequest {
                    document: &doc,
                    base_revision: Some("rev-1"),
                    force: false,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict { .. }));
        patch.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_push_with_matching_revision_updates() {
        let server = MockServer::start_async().await;
        let doc = document();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gists/abc");
                then.status(200).json_body(gist_body(&doc, "rev-2"));
            })
            .await;
        let patch = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/gists/abc");
                then.status(200).json_body(gist_body(&doc, "rev-2"));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", Some("abc".into()));
        let receipt = client
            .push(
                &config,
                PushRequest {
                    document: &doc,
                    base_revision: Some("rev-2"),
                    force: false,
                },
            )
            .await
            .unwrap();

        patch.assert_async().await;
        assert_eq!(receipt.revision.as_deref(), Some("rev-2"));
        assert!(receipt.gist_id.is_none());
    }

    #[tokio::test]
    async fn test_forced_push_skips_revision_check() {
        let server = MockServer::start_async().await;
        let doc = document();
        let get = server
            .mock_async(|when, then| {
                when.method(GET).path("/gists/abc");
                then.status(200).json_body(gist_body(&doc, "rev-9"));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/gists/abc");
                then.status(200).json_body(gist_body(&doc, "rev-10"));
            })
            .await;

        let client = client_for(&server);
        let config = RemoteTargetConfig::gist("work", GistProvider::Github, "tok", Some("abc".into()));
        let receipt = client
            .push(
                &config,
                PushRequest {
                    document: &doc,
                    base_revision: Some("rev-1"),
                    force: true,
                },
            )
            .await
            .unwrap();

        get.assert_hits_async(0).await;
        assert_eq!(receipt.revision.as_deref(), Some("rev-10"));
    }
}
