//! Session mode: one step per invocation, resumed by id.

use crate::integration::test_utils::{engine_harness, ScriptedTool};
use conduit::error::ApiError;
use conduit::workflow::{Confidence, SessionStatus, ToolKind, WorkflowRequest};
use serde_json::json;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60 * 60);

fn in_progress(step: u32, findings: &str) -> serde_json::Value {
    json!({
        "step_number": step,
        "total_steps": 3,
        "next_step_required": true,
        "findings": findings,
        "files_checked": [format!("src/step{}.rs", step)],
        "confidence": "medium"
    })
}

#[tokio::test]
async fn session_runs_one_step_per_call_until_complete() {
    let harness = engine_harness(10, TTL);
    let tool = ScriptedTool::json(vec![
        in_progress(1, "Handlers share a global lock"),
        json!({
            "step_number": 2,
            "total_steps": 2,
            "next_step_required": false,
            "confidence": "very_high",
            "content": "Move the lock into the request scope."
        }),
    ]);

    let first = harness
        .engine
        .start_session(ToolKind::CodeReview, &tool, &WorkflowRequest::new("review handlers"))
        .await
        .unwrap();
    assert_eq!(first.status, SessionStatus::InProgress);
    assert_eq!(first.step_number, 1);
    assert!(first.next_step_required);
    assert!(first.session_id.starts_with("codereview_"));
    let command = first.continuation_command.clone().unwrap();
    assert_eq!(
        command,
        format!("conduit codereview --session {} --continue '<findings>'", first.session_id)
    );
    let instructions = first.instructions.clone().unwrap();
    assert_eq!(instructions.status, "workflow_incomplete");
    assert_eq!(instructions.next_step, 2);

    let stored = harness.sessions.load(&first.session_id).unwrap().unwrap();
    assert_eq!(stored.tool_name, "codereview");
    assert_eq!(stored.state.current_step, 1);
    assert_eq!(stored.state.confidence, Some(Confidence::Medium));

    let second = harness
        .engine
        .continue_session(
            ToolKind::CodeReview,
            &tool,
            &first.session_id,
            Some("Confirmed the lock is held across awaits".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(second.status, SessionStatus::Complete);
    assert!(!second.next_step_required);
    assert!(second.continuation_command.is_none());
    assert_eq!(second.content, "Move the lock into the request scope.");
    assert_eq!(second.state.confidence, Some(Confidence::VeryHigh));

    let seen = tool.seen.lock();
    assert_eq!(seen[1].step_number, 2);
    assert_eq!(seen[1].step, "review handlers");
    assert_eq!(seen[1].findings, "Confirmed the lock is held across awaits");
    assert_eq!(seen[1].files_checked, vec!["src/step1.rs".to_string()]);
    assert_eq!(seen[1].continuation_id.as_deref(), Some(first.session_id.as_str()));
    drop(seen);

    assert!(harness.sessions.load(&first.session_id).unwrap().is_none());
}

#[tokio::test]
async fn resume_without_findings_carries_the_previous_narrative() {
    let harness = engine_harness(10, TTL);
    let tool = ScriptedTool::json(vec![
        in_progress(1, "Initial survey"),
        in_progress(2, "Second pass"),
    ]);
    let first = harness
        .engine
        .start_session(ToolKind::Analyze, &tool, &WorkflowRequest::new("survey"))
        .await
        .unwrap();
    harness
        .engine
        .continue_session(ToolKind::Analyze, &tool, &first.session_id, Some("  ".to_string()))
        .await
        .unwrap();

    let seen = tool.seen.lock();
    assert_eq!(seen[1].findings, "Initial survey");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let harness = engine_harness(10, TTL);
    let tool = ScriptedTool::json(vec![]);
    let err = harness
        .engine
        .continue_session(ToolKind::Debug, &tool, "debug_0_00000000", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::SessionNotFound(ref id) if id == "debug_0_00000000"));
    assert_eq!(tool.calls(), 0);
    assert!(harness.sessions.load("debug_0_00000000").unwrap().is_none());
}

#[tokio::test]
async fn expired_session_is_not_found() {
    let harness = engine_harness(10, TTL);
    let tool = ScriptedTool::json(vec![in_progress(1, "start")]);
    let first = harness
        .engine
        .start_session(ToolKind::Debug, &tool, &WorkflowRequest::new("crash on boot"))
        .await
        .unwrap();

    harness.clock.advance(TTL + Duration::from_secs(1));

    let err = harness
        .engine
        .continue_session(ToolKind::Debug, &tool, &first.session_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::SessionNotFound(_)));
    assert_eq!(tool.calls(), 1);
}

#[tokio::test]
async fn session_of_another_tool_is_rejected() {
    let harness = engine_harness(10, TTL);
    let tool = ScriptedTool::json(vec![in_progress(1, "start")]);
    let first = harness
        .engine
        .start_session(ToolKind::Debug, &tool, &WorkflowRequest::new("crash on boot"))
        .await
        .unwrap();
    let err = harness
        .engine
        .continue_session(ToolKind::Planner, &tool, &first.session_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ValidationError { .. }));
    assert!(harness.sessions.load(&first.session_id).unwrap().is_some());
}

#[tokio::test]
async fn session_past_the_step_limit_fails_and_is_removed() {
    let harness = engine_harness(2, TTL);
    let tool = ScriptedTool::json(vec![
        in_progress(1, "one"),
        in_progress(2, "two"),
        in_progress(3, "three"),
    ]);
    let first = harness
        .engine
        .start_session(ToolKind::Refactor, &tool, &WorkflowRequest::new("split the module"))
        .await
        .unwrap();
    harness
        .engine
        .continue_session(ToolKind::Refactor, &tool, &first.session_id, None)
        .await
        .unwrap();
    let err = harness
        .engine
        .continue_session(ToolKind::Refactor, &tool, &first.session_id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::WorkflowExceeded { max_steps: 2, .. }));
    assert!(harness.sessions.load(&first.session_id).unwrap().is_none());
}

#[tokio::test]
async fn failing_step_discards_the_session() {
    let harness = engine_harness(10, TTL);
    let tool = ScriptedTool::new(vec![
        Ok(in_progress(1, "one").to_string()),
        Err(ApiError::Timeout("tool took too long".to_string())),
    ]);
    let first = harness
        .engine
        .start_session(ToolKind::TestGen, &tool, &WorkflowRequest::new("cover the parser"))
        .await
        .unwrap();
    let err = harness
        .engine
        .continue_session(ToolKind::TestGen, &tool, &first.session_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)));
    assert!(harness.sessions.load(&first.session_id).unwrap().is_none());
}

#[tokio::test]
async fn stale_step_number_cannot_keep_a_session_alive() {
    let harness = engine_harness(2, TTL);
    let stuck = || json!({"step_number": 1, "next_step_required": true, "findings": "still looking"});
    let tool = ScriptedTool::json(vec![stuck(), stuck(), stuck(), stuck()]);

    let first = harness
        .engine
        .start_session(ToolKind::Debug, &tool, &WorkflowRequest::new("cache never warms"))
        .await
        .unwrap();
    let second = harness
        .engine
        .continue_session(ToolKind::Debug, &tool, &first.session_id, None)
        .await
        .unwrap();
    assert_eq!(second.step_number, 2);
    assert_eq!(second.instructions.unwrap().next_step, 3);

    let err = harness
        .engine
        .continue_session(ToolKind::Debug, &tool, &first.session_id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::WorkflowExceeded { max_steps: 2, .. }));
    assert_eq!(tool.calls(), 3);
    let sent: Vec<u32> = tool.seen.lock().iter().map(|a| a.step_number).collect();
    assert_eq!(sent, vec![1, 2, 3]);
    assert!(harness.sessions.load(&first.session_id).unwrap().is_none());
}

#[tokio::test]
async fn tool_metadata_survives_a_resume() {
    let harness = engine_harness(10, TTL);
    let tool = ScriptedTool::json(vec![
        json!({"step_number": 1, "next_step_required": true, "analysis_scope": "auth"}),
        json!({"step_number": 2, "next_step_required": true, "entry_point": "login"}),
        json!({"step_number": 3, "next_step_required": false, "content": "done"}),
    ]);

    let first = harness
        .engine
        .start_session(ToolKind::Analyze, &tool, &WorkflowRequest::new("map auth"))
        .await
        .unwrap();
    assert_eq!(first.state.metadata.get("analysis_scope"), Some(&json!("auth")));

    let second = harness
        .engine
        .continue_session(ToolKind::Analyze, &tool, &first.session_id, None)
        .await
        .unwrap();
    assert_eq!(second.state.metadata.get("analysis_scope"), Some(&json!("auth")));
    assert_eq!(second.state.metadata.get("entry_point"), Some(&json!("login")));

    let third = harness
        .engine
        .continue_session(ToolKind::Analyze, &tool, &first.session_id, None)
        .await
        .unwrap();
    assert_eq!(third.status, SessionStatus::Complete);
    assert_eq!(third.state.metadata.len(), 2);

    let seen = tool.seen.lock();
    assert_eq!(seen[1].metadata.get("analysis_scope"), Some(&json!("auth")));
}
