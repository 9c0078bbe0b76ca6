//! Chat presentation.

use crate::cli::parse::OutputFormat;
use crate::cli::presentation::shared::to_json;
use crate::error::ApiError;
use crate::gateway::GatewayResponse;

pub fn format_chat_response(response: &GatewayResponse, format: OutputFormat) -> Result<String, ApiError> {
    match format {
        OutputFormat::Json => to_json(response),
        OutputFormat::Text => Ok(response.content.trim_end().to_string()),
    }
}
