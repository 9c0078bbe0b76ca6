//! Workflow results: batch summaries and session steps.

use crate::cli::parse::OutputFormat;
use crate::cli::presentation::shared::{bullet_section, heading, table, to_json};
use crate::error::ApiError;
use crate::workflow::{Issue, SessionStatus, SessionStepOutcome, WorkflowSummary};
use owo_colors::OwoColorize;

fn issues_table(issues: &[Issue]) -> String {
    let mut table = table(vec!["Severity", "Issue"]);
    for issue in issues {
        table.add_row(vec![issue.severity.as_str(), issue.description.as_str()]);
    }
    table.to_string()
}

pub fn format_workflow_summary(
    summary: &WorkflowSummary,
    format: OutputFormat,
) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(summary);
    }
    let mut out = format!(
        "{}\n{} steps executed",
        heading(&format!("{} workflow complete", summary.tool)),
        summary.total_steps_executed
    );
    if let Some(confidence) = summary.final_confidence {
        out.push_str(&format!(", confidence {}", confidence.as_str().green()));
    }
    out.push('\n');

    if !summary.step_findings.is_empty() {
        out.push_str("\nFindings by step:\n");
        for finding in &summary.step_findings {
            out.push_str(&format!("  {}. {}\n", finding.step_number, finding.findings));
        }
    }
    bullet_section(&mut out, "Relevant files", &summary.relevant_files);
    bullet_section(&mut out, "Hypotheses", &summary.hypotheses);
    if !summary.issues_found.is_empty() {
        out.push_str(&format!("\nIssues ({}):\n", summary.issues_found.len()));
        out.push_str(&issues_table(&summary.issues_found));
        out.push('\n');
    }
    if !summary.final_content.trim().is_empty() {
        out.push_str(&format!("\n{}\n{}\n", heading("Result"), summary.final_content.trim()));
    }
    Ok(out)
}

pub fn format_session_outcome(
    outcome: &SessionStepOutcome,
    format: OutputFormat,
) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(outcome);
    }
    let mut out = match outcome.status {
        SessionStatus::Complete => format!(
            "{}\n",
            heading(&format!("{} session {} complete", outcome.tool, outcome.session_id))
        ),
        SessionStatus::InProgress => format!(
            "{}\nStep {} of ~{}\n",
            heading(&format!("{} session {}", outcome.tool, outcome.session_id)),
            outcome.step_number,
            outcome.total_steps
        ),
    };
    if !outcome.content.trim().is_empty() {
        out.push_str(&format!("\n{}\n", outcome.content.trim()));
    }
    bullet_section(&mut out, "Relevant files", &outcome.state.relevant_files);
    if let Some(instructions) = &outcome.instructions {
        out.push_str(&format!("\n{}\n{}\n", instructions.message.yellow(), instructions.required_action));
    }
    if let Some(command) = &outcome.continuation_command {
        out.push_str(&format!("\nContinue with:\n  {}\n", command.cyan()));
    }
    Ok(out)
}
