//! Domain-level error types for tabsync.
//!
//! Every failure that crosses a remote boundary is normalized into one of the
//! sync kinds below before it reaches the orchestrator, so callers never see
//! raw transport errors.

use thiserror::Error;

/// Normalized failure kind, as recorded in the sync log and shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Auth,
    Transport,
    Format,
    Conflict,
    Busy,
    Precondition,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::NotFound => "not-found",
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::Format => "format",
            Self::Conflict => "conflict",
            Self::Busy => "busy",
            Self::Precondition => "precondition",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad config input, rejected before persistence.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Config or remote snapshot absent.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Credentials rejected by the remote.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Network failure, timeout or unexpected HTTP status.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Unparseable payload or unsupported schema version.
    #[error("Format error: {message}")]
    Format {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Optimistic-concurrency violation.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Another operation is already running for the target.
    #[error("Target {target} is busy with another sync")]
    Busy { target: String },

    /// `push_to_all_remotes` was called with nothing to push to.
    #[error("No enabled sync targets are configured")]
    NoTargets,

    /// Failed to open or query the database.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a database error from rusqlite error.
    pub fn database(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a format error from a JSON parse failure.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::Format {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a transport error from a reqwest failure.
    pub fn transport(message: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(err),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
            source: None,
        }
    }

    /// The normalized kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Format { .. } => ErrorKind::Format,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::NoTargets => ErrorKind::Precondition,
            Self::Database { .. } | Self::Config { .. } | Self::Io { .. } => ErrorKind::Storage,
        }
    }

    /// Only transport failures get an automatic retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AppError::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(AppError::NoTargets.kind(), ErrorKind::Precondition);
        assert_eq!(
            AppError::Busy { target: "gist/a".into() }.kind(),
            ErrorKind::Busy
        );
    }

    #[test]
    fn test_only_transport_is_retryable() {
        let transport = AppError::Transport {
            message: "timeout".into(),
            source: None,
        };
        assert!(transport.is_retryable());
        assert!(!AppError::format("bad json").is_retryable());
        assert!(!AppError::Auth { message: "401".into() }.is_retryable());
    }
}
