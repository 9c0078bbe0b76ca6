//! CLI output: error mapping from domain errors to a stable status object.

use crate::cli::parse::OutputFormat;
use crate::error::{ApiError, ErrorKind};
use serde::Serialize;

/// What a failed command reports to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorStatus {
    pub status: &'static str,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&ApiError> for ErrorStatus {
    fn from(e: &ApiError) -> Self {
        Self {
            status: "error",
            kind: e.kind(),
            message: e.to_string(),
            suggestion: e.suggestion(),
            retry_after_secs: e.retry_after().map(|d| d.as_secs()),
        }
    }
}

/// Render `e` for the CLI: a JSON status object, or a short text block.
pub fn map_error(e: &ApiError, format: OutputFormat) -> String {
    let status = ErrorStatus::from(e);
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&status)
            .unwrap_or_else(|_| format!("{{\"status\":\"error\",\"message\":{:?}}}", status.message)),
        OutputFormat::Text => {
            let mut out = format!("Error [{}]: {}", status.kind.as_str(), status.message);
            if let Some(suggestion) = &status.suggestion {
                out.push_str(&format!("\nSuggestion: {}", suggestion));
            }
            if let Some(secs) = status.retry_after_secs {
                out.push_str(&format!("\nRetry after: {}s", secs));
            }
            out
        }
    }
}
