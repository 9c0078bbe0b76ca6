//! Error types for the Conduit workflow client.
//!
//! `StorageError` covers persistence failures (key-value backends, response cache,
//! lock files). `ApiError` is the crate-wide error every command path returns; it keeps
//! enough structure (kind, message, retry-after hint) for the CLI to render a status
//! object without re-deriving anything.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid key or pattern: {0}")]
    InvalidKey(String),

    #[error("Lock {path:?} is held by live process {pid}")]
    LockHeld { path: PathBuf, pid: u32 },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Stable error category, used by retry policies and the CLI status object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    RateLimit,
    Network,
    Timeout,
    Authentication,
    Provider,
    Tool,
    Storage,
    WorkflowExceeded,
    SessionNotFound,
    RetryExhausted,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Provider => "provider",
            ErrorKind::Tool => "tool",
            ErrorKind::Storage => "storage",
            ErrorKind::WorkflowExceeded => "workflow_exceeded",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::RetryExhausted => "retry_exhausted",
        }
    }
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid value for '{field}' ({value:?}): {message}")]
    ValidationError {
        field: String,
        value: String,
        message: String,
    },

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {message}")]
    ProviderRateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Workflow '{tool}' exceeded maximum steps ({max_steps})")]
    WorkflowExceeded { tool: String, max_steps: usize },

    #[error("Session not found or expired: {0}")]
    SessionNotFound(String),

    #[error("Retry exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<ApiError>,
    },

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl ApiError {
    /// Shorthand for a validation failure on a named field.
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ApiError::ValidationError {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::ConfigError(_) => ErrorKind::Configuration,
            ApiError::ValidationError { .. } => ErrorKind::Validation,
            ApiError::ProviderError(_)
            | ApiError::ProviderRequestFailed(_)
            | ApiError::ProviderModelNotFound(_) => ErrorKind::Provider,
            ApiError::ProviderAuthFailed(_) => ErrorKind::Authentication,
            ApiError::ProviderRateLimit { .. } => ErrorKind::RateLimit,
            ApiError::NetworkError(_) => ErrorKind::Network,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::ToolFailed { .. } => ErrorKind::Tool,
            ApiError::WorkflowExceeded { .. } => ErrorKind::WorkflowExceeded,
            ApiError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            ApiError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            ApiError::StorageError(_) => ErrorKind::Storage,
        }
    }

    /// Server-provided wait hint, looking through a retry-exhausted wrapper.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::ProviderRateLimit { retry_after, .. } => *retry_after,
            ApiError::RetryExhausted { last, .. } => last.retry_after(),
            _ => None,
        }
    }

    /// User-facing hint for the failures automated callers most often trip over.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ApiError::SessionNotFound(_) => Some(
                "Session expired or unknown: restart the workflow without --session".to_string(),
            ),
            ApiError::ValidationError { .. } => Some(
                "Schema mismatch: check the required fields for this mode".to_string(),
            ),
            ApiError::WorkflowExceeded { .. } => Some(
                "Raise workflow.max_steps or narrow the request, then restart the workflow"
                    .to_string(),
            ),
            ApiError::RetryExhausted { last, .. } if last.kind() == ErrorKind::RateLimit => {
                Some("Provider is rate limiting requests; wait and retry".to_string())
            }
            _ => None,
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
