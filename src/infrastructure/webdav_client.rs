//! WebDAV backend.
//!
//! The snapshot is one resource below the configured base URL. The revision
//! token is the server's strong `ETag`, or its `Last-Modified` date (prefixed
//! with `lm:`) for servers that send no entity tag or only a weak one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};

use crate::domain::{
    AppError, PushReceipt, PushRequest, RemoteBackend, RemoteClient, RemoteSnapshot,
    RemoteTargetConfig, Result, TabGroupDocument,
};

use super::http::{classify_status, request_error, with_retry};

const LAST_MODIFIED_PREFIX: &str = "lm:";

/// Borrowed view of a WebDAV target's connection settings.
struct DavAccess<'a> {
    base: Url,
    resource: Url,
    username: &'a str,
    password: &'a str,
    remote_path: &'a str,
}

impl<'a> DavAccess<'a> {
    fn from_config(config: &'a RemoteTargetConfig) -> Result<Self> {
        match &config.backend {
            RemoteBackend::WebDav {
                base_url,
                username,
                password,
                remote_path,
            } => {
                let base = collection_url(base_url)?;
                let resource = resource_url(&base, remote_path)?;
                Ok(Self {
                    base,
                    resource,
                    username,
                    password,
                    remote_path,
                })
            }
            RemoteBackend::Gist { .. } => Err(AppError::validation(format!(
                "target {} is not a webdav target",
                config.id
            ))),
        }
    }
}

/// Parse `base_url` as a collection, so relative joins stay below it.
fn collection_url(base_url: &str) -> Result<Url> {
    let mut normalized = base_url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized)
        .map_err(|e| AppError::validation(format!("invalid WebDAV base URL {base_url}: {e}")))
}

fn resource_url(base: &Url, remote_path: &str) -> Result<Url> {
    base.join(remote_path.trim_start_matches('/'))
        .map_err(|e| AppError::validation(format!("invalid WebDAV path {remote_path}: {e}")))
}

/// Collections that must exist for `remote_path`, outermost first.
fn parent_collections(base: &Url, remote_path: &str) -> Result<Vec<Url>> {
    let segments: Vec<&str> = remote_path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let mut collections = Vec::new();
    let mut prefix = String::new();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        prefix.push_str(segment);
        prefix.push('/');
        collections.push(resource_url(base, &prefix)?);
    }
    Ok(collections)
}

/// Extract the revision token from response validators.
///
/// Weak entity tags never satisfy `If-Match`, so they are skipped.
fn revision_from_headers(headers: &HeaderMap) -> Option<String> {
    let strong_etag = headers
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|etag| !etag.starts_with("W/"));
    if let Some(etag) = strong_etag {
        return Some(etag.to_string());
    }
    headers
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(|lm| format!("{LAST_MODIFIED_PREFIX}{lm}"))
}

/// The conditional-request header that guards a write against `revision`.
fn precondition_for(revision: &str) -> (HeaderName, &str) {
    revision.strip_prefix(LAST_MODIFIED_PREFIX).map_or(
        (header::IF_MATCH, revision),
        |date| (header::IF_UNMODIFIED_SINCE, date),
    )
}

/// Remote client for WebDAV targets.
pub struct WebDavClient {
    http: reqwest::Client,
    retry_backoff: Duration,
}

impl WebDavClient {
    #[must_use]
    pub const fn new(http: reqwest::Client, retry_backoff: Duration) -> Self {
        Self {
            http,
            retry_backoff,
        }
    }

    fn request(&self, method: Method, access: &DavAccess<'_>, url: &Url) -> RequestBuilder {
        self.http
            .request(method, url.clone())
            .basic_auth(access.username, Some(access.password))
    }

    async fn send(request: RequestBuilder, context: &str) -> Result<Response> {
        request.send().await.map_err(|e| request_error(context, e))
    }

    /// One PUT of the snapshot. Missing parents (404, 409) and a failed
    /// precondition (412) come back as responses for the caller to act on.
    async fn put_once(
        &self,
        access: &DavAccess<'_>,
        body: &str,
        precondition: Option<(HeaderName, &str)>,
    ) -> Result<Response> {
        let mut request = self
            .request(Method::PUT, access, &access.resource)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some((name, value)) = precondition {
            request = request.header(name, value);
        }

        let response = Self::send(request, "upload snapshot").await?;
        let status = response.status();
        if status.is_success()
            || matches!(
                status,
                StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
            )
        {
            Ok(response)
        } else {
            Err(classify_status(status, "upload snapshot"))
        }
    }

    /// Create every missing parent collection of the snapshot resource.
    async fn ensure_collections(&self, access: &DavAccess<'_>) -> Result<()> {
        let mkcol = Method::from_bytes(b"MKCOL").map_err(|e| AppError::Transport {
            message: format!("MKCOL method unavailable: {e}"),
            source: None,
        })?;

        for collection in parent_collections(&access.base, access.remote_path)? {
            let (mkcol, url) = (&mkcol, &collection);
            let status = with_retry(self.retry_backoff, "create collection", || async move {
                let response =
                    Self::send(self.request(mkcol.clone(), access, url), "create collection")
                        .await?;
                let status = response.status();
                // 405 means the collection already exists.
                if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
                    Ok(status)
                } else {
                    Err(classify_status(status, "create collection"))
                }
            })
            .await?;
            tracing::debug!(url = %collection, %status, "Ensured WebDAV collection");
        }

        Ok(())
    }

    /// Ask the server for the current validators when a PUT returned none.
    async fn head_revision(&self, access: &DavAccess<'_>) -> Result<Option<String>> {
        with_retry(self.retry_backoff, "read snapshot validators", || async move {
            let response = Self::send(
                self.request(Method::HEAD, access, &access.resource),
                "read snapshot validators",
            )
            .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(classify_status(status, "read snapshot validators"));
            }
            Ok(revision_from_headers(response.headers()))
        })
        .await
    }
}

#[async_trait]
impl RemoteClient for WebDavClient {
    async fn pull(&self, config: &RemoteTargetConfig) -> Result<RemoteSnapshot> {
        let access = &DavAccess::from_config(config)?;

        let (body, revision) = with_retry(self.retry_backoff, "download snapshot", || async move {
            let response = Self::send(
                self.request(Method::GET, access, &access.resource),
                "download snapshot",
            )
            .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(classify_status(status, "download snapshot"));
            }
            let revision = revision_from_headers(response.headers());
            let body = response
                .text()
                .await
                .map_err(|e| request_error("download snapshot", e))?;
            Ok((body, revision))
        })
        .await?;

        let document = TabGroupDocument::from_json(&body)?;
        tracing::debug!(url = %access.resource, ?revision, "Fetched WebDAV snapshot");

        Ok(RemoteSnapshot { document, revision })
    }

    async fn push(
        &self,
        config: &RemoteTargetConfig,
        request: PushRequest<'_>,
    ) -> Result<PushReceipt> {
        let access = DavAccess::from_config(config)?;
        let body = request.document.to_json()?;
        let precondition = if request.force {
            None
        } else {
            request.base_revision.map(precondition_for)
        };

        let put = || self.put_once(&access, &body, precondition.clone());
        let mut response = with_retry(self.retry_backoff, "upload snapshot", put).await?;

        // Missing parent collections surface as 404 or 409 on PUT.
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT
        ) {
            self.ensure_collections(&access).await?;
            response = with_retry(self.retry_backoff, "upload snapshot", put).await?;
        }

        let status = response.status();
        if status == StatusCode::PRECONDITION_FAILED {
            return Err(AppError::conflict(format!(
                "{} changed remotely since revision {}",
                access.resource,
                request.base_revision.unwrap_or("none")
            )));
        }
        if !status.is_success() {
            return Err(classify_status(status, "upload snapshot"));
        }

        let revision = match revision_from_headers(response.headers()) {
            Some(revision) => Some(revision),
            None => self.head_revision(&access).await?,
        };

        Ok(PushReceipt {
            revision,
            gist_id: None,
        })
    }
}
