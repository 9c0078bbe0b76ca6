//! Workflow continuation engine.
//!
//! Drives a multi-step tool to completion in one of two modes:
//!
//! - **batch**: one invocation loops step after step until the tool reports
//!   `next_step_required: false` ([`WorkflowEngine::run_batch`]);
//! - **session**: each invocation runs one step, persists the merged state and hands the
//!   caller a continuation command ([`WorkflowEngine::start_session`],
//!   [`WorkflowEngine::continue_session`]).
//!
//! Both modes share the step limit: a tool still asking for more work after
//! `max_steps` steps fails the workflow with [`ApiError::WorkflowExceeded`], and any
//! failure removes the in-progress state before the error propagates.

pub mod batch;
pub mod continuation;
pub mod registry;
pub mod state;
pub mod store;
pub mod tool;

pub use batch::{StepFinding, WorkflowSummary};
pub use continuation::{ContinuationInstructions, SessionStatus, SessionStepOutcome};
pub use registry::{StepDefaults, ToolKind, ToolRegistry, WorkflowRequest};
pub use state::{Confidence, Issue, StepArguments, StepResult, WorkflowState};
pub use store::WorkflowStateStore;
pub use tool::WorkflowTool;

use crate::clock::SharedClock;
use crate::error::ApiError;
use crate::session::SessionStore;
use crate::storage::SharedStorage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Engine limits and the CLI name used in continuation commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_cli_name")]
    pub cli_name: String,
}

fn default_max_steps() -> usize {
    10
}

fn default_cli_name() -> String {
    "conduit".to_string()
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            cli_name: default_cli_name(),
        }
    }
}

impl WorkflowSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_steps == 0 {
            return Err("max_steps must be at least 1".to_string());
        }
        if self.cli_name.trim().is_empty() {
            return Err("cli_name cannot be empty".to_string());
        }
        Ok(())
    }
}

pub struct WorkflowEngine {
    registry: Arc<ToolRegistry>,
    states: WorkflowStateStore,
    sessions: Arc<SessionStore>,
    clock: SharedClock,
    settings: WorkflowSettings,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        storage: SharedStorage,
        sessions: Arc<SessionStore>,
        clock: SharedClock,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            registry,
            states: WorkflowStateStore::new(storage),
            sessions,
            clock,
            settings,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.settings.max_steps = max_steps.max(1);
        self
    }

    pub fn max_steps(&self) -> usize {
        self.settings.max_steps
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn exceeded(&self, kind: ToolKind) -> ApiError {
        ApiError::WorkflowExceeded {
            tool: kind.as_str().to_string(),
            max_steps: self.settings.max_steps,
        }
    }
}
