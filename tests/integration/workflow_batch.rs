//! Batch mode: one call drives a tool until it reports completion.

use crate::integration::test_utils::{engine_harness, ScriptedTool};
use conduit::error::ApiError;
use conduit::workflow::{Confidence, ToolKind, WorkflowRequest};
use serde_json::json;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(3 * 60 * 60);

#[tokio::test]
async fn oauth_investigation_completes_when_confidence_is_high() {
    let harness = engine_harness(5, TTL);
    let tool = ScriptedTool::json(vec![
        json!({
            "step_number": 1,
            "total_steps": 3,
            "next_step_required": true,
            "findings": "Callback handler accepts the code but the session cookie is missing",
            "files_checked": ["src/oauth/callback.rs"],
            "relevant_files": ["src/oauth/callback.rs"],
            "confidence": "low"
        }),
        json!({
            "step_number": 2,
            "total_steps": 4,
            "next_step_required": true,
            "findings": "Cookie is set with SameSite=Strict, so the redirect drops it",
            "files_checked": ["src/oauth/callback.rs", "src/http/cookies.rs"],
            "relevant_files": ["src/http/cookies.rs"],
            "hypothesis": "SameSite=Strict blocks the cross-site redirect",
            "confidence": "medium"
        }),
        json!({
            "step_number": 3,
            "total_steps": 4,
            "next_step_required": false,
            "findings": "Switching to SameSite=Lax restores the login",
            "issues_found": [{"severity": "high", "description": "Session cookie uses SameSite=Strict"}],
            "confidence": "high",
            "content": "Root cause: the session cookie is SameSite=Strict."
        }),
    ]);

    let mut request = WorkflowRequest::new("OAuth login fails after the provider redirect");
    request.files = vec!["src/oauth/callback.rs".to_string()];
    let summary = harness
        .engine
        .run_batch(ToolKind::Debug, &tool, &request)
        .await
        .unwrap();

    assert!(summary.workflow_complete);
    assert_eq!(summary.total_steps_executed, 3);
    assert_eq!(summary.total_steps, 4);
    assert_eq!(summary.final_confidence, Some(Confidence::High));
    assert!(summary.structured);
    assert_eq!(summary.final_content, "Root cause: the session cookie is SameSite=Strict.");
    assert_eq!(summary.step_findings.len(), 3);
    assert_eq!(
        summary.files_checked,
        vec!["src/oauth/callback.rs".to_string(), "src/http/cookies.rs".to_string()]
    );
    assert_eq!(summary.relevant_files, vec!["src/http/cookies.rs".to_string()]);
    assert_eq!(summary.hypotheses.len(), 1);
    assert_eq!(summary.issues_found.len(), 1);

    let seen = tool.seen.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].step_number, 1);
    assert_eq!(seen[0].relevant_files, vec!["src/oauth/callback.rs".to_string()]);
    assert_eq!(seen[1].step_number, 2);
    assert_eq!(seen[2].step_number, 3);
    assert_eq!(seen[2].total_steps, 4);
    assert_eq!(seen[2].confidence, Some(Confidence::Medium));
}

#[tokio::test]
async fn batch_state_is_removed_after_the_run() {
    let harness = engine_harness(5, TTL);
    let tool = ScriptedTool::json(vec![
        json!({"step_number": 1, "next_step_required": true, "findings": "a"}),
        json!({"step_number": 2, "next_step_required": false, "findings": "b"}),
    ]);
    harness
        .engine
        .run_batch(ToolKind::Analyze, &tool, &WorkflowRequest::new("map the modules"))
        .await
        .unwrap();
    assert!(harness.storage.list_keys("*").unwrap().is_empty());
}

#[tokio::test]
async fn unstructured_reply_is_the_final_answer() {
    let harness = engine_harness(5, TTL);
    let tool = ScriptedTool::new(vec![Ok("The race is in token refresh.".to_string())]);
    let summary = harness
        .engine
        .run_batch(ToolKind::ThinkDeep, &tool, &WorkflowRequest::new("why is it flaky"))
        .await
        .unwrap();
    assert!(summary.workflow_complete);
    assert!(!summary.structured);
    assert_eq!(summary.total_steps_executed, 1);
    assert_eq!(summary.final_content, "The race is in token refresh.");
}

#[tokio::test]
async fn tool_that_never_finishes_exceeds_the_step_limit() {
    let harness = engine_harness(3, TTL);
    let replies = (1..=10)
        .map(|n| json!({"step_number": n, "next_step_required": true, "findings": format!("step {}", n)}))
        .collect();
    let tool = ScriptedTool::json(replies);

    let err = harness
        .engine
        .run_batch(ToolKind::CodeReview, &tool, &WorkflowRequest::new("review the diff"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::WorkflowExceeded { max_steps: 3, .. }));
    assert_eq!(tool.calls(), 4);
    assert!(harness.storage.list_keys("*").unwrap().is_empty());
}

#[tokio::test]
async fn regressing_step_numbers_do_not_stall_the_counter() {
    let harness = engine_harness(3, TTL);
    let tool = ScriptedTool::json(
        [3, 1, 2, 1, 1, 1]
            .iter()
            .map(|n| json!({"step_number": n, "next_step_required": true}))
            .collect(),
    );

    let err = harness
        .engine
        .run_batch(ToolKind::Debug, &tool, &WorkflowRequest::new("token refresh loops"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::WorkflowExceeded { max_steps: 3, .. }));
    let sent: Vec<u32> = tool.seen.lock().iter().map(|a| a.step_number).collect();
    assert_eq!(sent, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn tool_failure_propagates_and_clears_state() {
    let harness = engine_harness(5, TTL);
    let tool = ScriptedTool::new(vec![
        Ok(json!({"step_number": 1, "next_step_required": true}).to_string()),
        Err(ApiError::ToolFailed {
            tool: "secaudit".to_string(),
            message: "scanner crashed".to_string(),
        }),
    ]);
    let err = harness
        .engine
        .run_batch(ToolKind::SecAudit, &tool, &WorkflowRequest::new("audit auth"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ToolFailed { .. }));
    assert!(harness.storage.list_keys("*").unwrap().is_empty());
}

#[tokio::test]
async fn empty_prompt_is_rejected_before_any_step() {
    let harness = engine_harness(5, TTL);
    let tool = ScriptedTool::json(vec![]);
    let err = harness
        .engine
        .run_batch(ToolKind::Planner, &tool, &WorkflowRequest::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ValidationError { .. }));
    assert_eq!(tool.calls(), 0);
}
