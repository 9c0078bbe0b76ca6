//! Session command presentation: list, show, delete.

use crate::cli::parse::OutputFormat;
use crate::cli::presentation::shared::{bullet_section, heading, table, to_json};
use crate::error::ApiError;
use crate::session::SessionRecord;
use serde_json::json;

pub fn format_session_list(
    sessions: &[(String, SessionRecord)],
    format: OutputFormat,
) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        let rows: Vec<_> = sessions
            .iter()
            .map(|(id, record)| {
                json!({
                    "session_id": id,
                    "tool": record.tool_name,
                    "step": record.state.current_step,
                    "total_steps": record.state.total_steps,
                    "confidence": record.state.confidence,
                    "last_updated": record.last_updated,
                })
            })
            .collect();
        return to_json(&json!({ "sessions": rows, "total": sessions.len() }));
    }
    if sessions.is_empty() {
        return Ok("No active sessions.".to_string());
    }
    let mut table = table(vec!["Session", "Tool", "Step", "Confidence", "Last Updated"]);
    for (id, record) in sessions {
        table.add_row(vec![
            id.clone(),
            record.tool_name.clone(),
            format!("{}/{}", record.state.current_step, record.state.total_steps),
            record
                .state
                .confidence
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "-".to_string()),
            record.last_updated.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    Ok(format!("{}\n\nTotal: {} session(s)", table, sessions.len()))
}

pub fn format_session_show(record: &SessionRecord, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(record);
    }
    let state = &record.state;
    let mut out = format!(
        "{}\nTool: {}\nGoal: {}\nStep: {} of ~{}\nCreated: {}\nUpdated: {}\n",
        heading(&format!("Session {}", record.session_id)),
        record.tool_name,
        record.arguments.step,
        state.current_step,
        state.total_steps,
        record.created_at.to_rfc3339(),
        record.last_updated.to_rfc3339(),
    );
    if let Some(confidence) = state.confidence {
        out.push_str(&format!("Confidence: {}\n", confidence));
    }
    if !state.findings.trim().is_empty() {
        out.push_str(&format!("\nFindings:\n{}\n", state.findings.trim()));
    }
    bullet_section(&mut out, "Files checked", &state.files_checked);
    bullet_section(&mut out, "Relevant files", &state.relevant_files);
    bullet_section(&mut out, "Hypotheses", &state.hypotheses);
    let issues: Vec<String> = state
        .issues_found
        .iter()
        .map(|i| format!("[{}] {}", i.severity, i.description))
        .collect();
    bullet_section(&mut out, "Issues", &issues);
    Ok(out)
}

pub fn format_session_delete(session_id: &str, format: OutputFormat) -> Result<String, ApiError> {
    match format {
        OutputFormat::Json => to_json(&json!({ "deleted": session_id })),
        OutputFormat::Text => Ok(format!("Deleted session {}", session_id)),
    }
}
