//! Shared HTTP plumbing for the remote clients.
//!
//! Builds the one `reqwest::Client` both backends use, maps HTTP statuses onto
//! the sync error taxonomy, and implements the single retry for transport
//! failures.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::domain::{AppConfig, AppError, Result};

/// Build the HTTP client used by every backend.
///
/// # Errors
/// Returns a config error if the TLS backend cannot be initialized.
pub fn build_client(config: &AppConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.sync.request_timeout_secs))
        .user_agent(config.remote.user_agent.clone())
        .build()
        .map_err(|e| AppError::Config {
            message: format!("Failed to build HTTP client: {e}"),
        })
}

/// Map a non-success status onto the error taxonomy.
pub fn classify_status(status: StatusCode, context: &str) -> AppError {
    let message = format!("{context}: HTTP {status}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Auth { message },
        StatusCode::NOT_FOUND => AppError::NotFound { message },
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => AppError::Conflict { message },
        _ => AppError::Transport {
            message,
            source: None,
        },
    }
}

/// Normalize a reqwest failure (timeout, DNS, connection reset, body read).
pub fn request_error(context: &str, err: reqwest::Error) -> AppError {
    let reason = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    AppError::transport(format!("{context}: {reason}"), err)
}

/// Run `op`, retrying it once after `backoff` if it fails with a retryable error.
pub async fn with_retry<T, F, Fut>(backoff: Duration, context: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(e) if e.is_retryable() => {
            tracing::debug!(context, error = %e, ?backoff, "Retrying after transport failure");
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "get"),
            AppError::Auth { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "get"),
            AppError::Auth { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "get"),
            AppError::NotFound { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::PRECONDITION_FAILED, "put"),
            AppError::Conflict { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "put"),
            AppError::Transport { .. }
        ));
    }

    #[tokio::test]
    async fn test_retry_once_on_transport_error() {
        let calls = AtomicUsize::new(0);

        let result: Result<u32> = with_retry(Duration::from_millis(1), "test", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(AppError::Transport {
                        message: "flaky".into(),
                        source: None,
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_for_other_errors() {
        let calls = AtomicUsize::new(0);

        let result: Result<u32> = with_retry(Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::format("bad payload")) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Format { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_second_failure() {
        let calls = AtomicUsize::new(0);

        let result: Result<u32> = with_retry(Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::Transport {
                    message: "down".into(),
                    source: None,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
