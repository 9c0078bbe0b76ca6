//! Session records over real backends.

use conduit::clock::ManualClock;
use conduit::session::{generate_session_id, SessionStore};
use conduit::storage::{FileStorage, StorageBackend};
use conduit::workflow::{Confidence, StepArguments, StepResult};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TTL: Duration = Duration::from_secs(3 * 60 * 60);

fn result(step: u32, confidence: &str) -> StepResult {
    StepResult::parse(
        &json!({
            "step_number": step,
            "total_steps": 3,
            "next_step_required": true,
            "findings": format!("finding {}", step),
            "confidence": confidence,
            "issues_found": [{"severity": "medium", "description": "unchecked unwrap"}]
        })
        .to_string(),
    )
    .unwrap()
}

#[test]
fn records_persist_across_store_instances() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let args = StepArguments::first_step("audit the parser", 3);
    {
        let storage = Arc::new(FileStorage::new(dir.path(), clock.clone(), TTL).unwrap());
        let store = SessionStore::new(storage, clock.clone());
        store.save("secaudit_1_aa", "secaudit", &result(1, "low"), &args).unwrap();
    }

    let storage = Arc::new(FileStorage::new(dir.path(), clock.clone(), TTL).unwrap());
    let store = SessionStore::new(storage, clock.clone());
    let record = store.load("secaudit_1_aa").unwrap().unwrap();
    assert_eq!(record.tool_name, "secaudit");
    assert_eq!(record.state.findings, "finding 1");
    assert_eq!(record.state.confidence, Some(Confidence::Low));
    assert_eq!(record.arguments.step, "audit the parser");
}

#[test]
fn resaving_keeps_created_at_and_dedupes_issues() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let storage = Arc::new(FileStorage::new(dir.path(), clock.clone(), TTL).unwrap());
    let store = SessionStore::new(storage, clock.clone());
    let mut args = StepArguments::first_step("audit", 3);

    let first = store.save("s1", "secaudit", &result(1, "low"), &args).unwrap();
    clock.advance(Duration::from_secs(60));
    args.step_number = 2;
    args.issues_found = first.state.issues_found.clone();
    let second = store.save("s1", "secaudit", &result(2, "high"), &args).unwrap();

    assert_eq!(second.created_at, first.created_at);
    assert!(second.last_updated > first.last_updated);
    assert_eq!(second.state.issues_found.len(), 1);
    assert_eq!(second.state.current_step, 2);
}

#[test]
fn unreadable_record_is_discarded() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let storage = Arc::new(FileStorage::new(dir.path(), clock.clone(), TTL).unwrap());
    storage.set(&SessionStore::key("broken"), "not json", None).unwrap();
    let store = SessionStore::new(storage.clone(), clock.clone());

    assert!(store.load("broken").unwrap().is_none());
    assert!(!storage.exists(&SessionStore::key("broken")).unwrap());
}

#[test]
fn list_active_skips_expired_sessions() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let storage = Arc::new(FileStorage::new(dir.path(), clock.clone(), TTL).unwrap());
    let short = SessionStore::new(storage.clone(), clock.clone()).with_ttl(Duration::from_secs(60));
    let long = SessionStore::new(storage, clock.clone());
    let args = StepArguments::first_step("goal", 3);

    short.save("debug_1_aa", "debug", &result(1, "low"), &args).unwrap();
    long.save("planner_1_bb", "planner", &result(1, "low"), &args).unwrap();
    clock.advance(Duration::from_secs(120));

    let active = long.list_active(None).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].0, "planner_1_bb");
    assert!(long.list_active(Some("debug")).unwrap().is_empty());
}

#[test]
fn generated_ids_follow_tool_timestamp_hex() {
    let now = chrono::Utc::now();
    let id = generate_session_id("thinkdeep", now).unwrap();
    let parts: Vec<&str> = id.split('_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "thinkdeep");
    assert_eq!(parts[1], now.timestamp().to_string());
    assert_eq!(parts[2].len(), 8);
    assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(id, generate_session_id("thinkdeep", now).unwrap());
}
