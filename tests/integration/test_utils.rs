//! Shared test utilities for integration tests
//!
//! Scripted workflow tools, a recording sleeper, and environment isolation for tests
//! that load configuration.

use async_trait::async_trait;
use conduit::clock::{ManualClock, SharedClock};
use conduit::error::ApiError;
use conduit::retry::Sleeper;
use conduit::session::SessionStore;
use conduit::storage::{MemoryStorage, SharedStorage};
use conduit::workflow::{StepArguments, ToolRegistry, WorkflowEngine, WorkflowSettings, WorkflowTool};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Replays canned replies in order and records every argument set it receives.
pub struct ScriptedTool {
    replies: Mutex<Vec<Result<String, ApiError>>>,
    pub seen: Mutex<Vec<StepArguments>>,
}

impl ScriptedTool {
    pub fn new(mut replies: Vec<Result<String, ApiError>>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn json(replies: Vec<serde_json::Value>) -> Self {
        Self::new(replies.into_iter().map(|v| Ok(v.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl WorkflowTool for ScriptedTool {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, arguments: &StepArguments) -> Result<String, ApiError> {
        self.seen.lock().push(arguments.clone());
        self.replies
            .lock()
            .pop()
            .unwrap_or_else(|| Err(ApiError::ToolFailed {
                tool: "scripted".to_string(),
                message: "no reply scripted".to_string(),
            }))
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// In-memory engine on a manual clock.
pub struct EngineHarness {
    pub engine: WorkflowEngine,
    pub storage: SharedStorage,
    pub sessions: Arc<SessionStore>,
    pub clock: Arc<ManualClock>,
}

pub fn engine_harness(max_steps: usize, ttl: Duration) -> EngineHarness {
    let clock = ManualClock::starting_now();
    let shared: SharedClock = clock.clone();
    let storage: SharedStorage = Arc::new(MemoryStorage::new(shared.clone(), ttl));
    let sessions = Arc::new(SessionStore::new(storage.clone(), shared.clone()).with_ttl(ttl));
    let settings = WorkflowSettings {
        max_steps,
        ..WorkflowSettings::default()
    };
    let engine = WorkflowEngine::new(
        Arc::new(ToolRegistry::builtin()),
        storage.clone(),
        sessions.clone(),
        shared,
        settings,
    );
    EngineHarness {
        engine,
        storage,
        sessions,
        clock,
    }
}

/// Run `f` with XDG and HOME pointed into `test_dir` and CONDUIT_* variables cleared.
/// The original environment is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let tracked = ["HOME", "XDG_CONFIG_HOME", "XDG_DATA_HOME", "XDG_CACHE_HOME"];
    let saved: Vec<(String, String)> = std::env::vars()
        .filter(|(k, _)| tracked.contains(&k.as_str()) || k.starts_with("CONDUIT_"))
        .collect();

    for (key, _) in &saved {
        std::env::remove_var(key);
    }
    for (var, sub) in [
        ("HOME", "home"),
        ("XDG_CONFIG_HOME", "config"),
        ("XDG_DATA_HOME", "data"),
        ("XDG_CACHE_HOME", "cache"),
    ] {
        let dir = test_dir.path().join(sub);
        std::fs::create_dir_all(&dir).unwrap();
        std::env::set_var(var, &dir);
    }

    let result = f();

    for var in tracked {
        std::env::remove_var(var);
    }
    let leaked: Vec<String> = std::env::vars()
        .map(|(k, _)| k)
        .filter(|k| k.starts_with("CONDUIT_"))
        .collect();
    for key in leaked {
        std::env::remove_var(key);
    }
    for (key, value) in saved {
        std::env::set_var(key, value);
    }
    result
}
