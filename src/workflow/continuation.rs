//! Session mode: one step per invocation, resumed by session id.

use crate::error::ApiError;
use crate::session::generate_session_id;
use crate::workflow::batch::log_step_mismatch;
use crate::workflow::{
    StepArguments, StepResult, ToolKind, WorkflowEngine, WorkflowRequest, WorkflowState,
    WorkflowTool,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Complete,
}

/// Instruction block returned while a session is incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationInstructions {
    pub status: String,
    pub message: String,
    pub next_step: u32,
    pub required_action: String,
}

/// Outcome of one session-mode step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStepOutcome {
    pub session_id: String,
    pub tool: String,
    pub status: SessionStatus,
    pub step_number: u32,
    pub total_steps: u32,
    pub next_step_required: bool,
    /// The tool's reply for this step (answer text, or the raw reply when unstructured).
    pub content: String,
    pub state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<ContinuationInstructions>,
}

impl WorkflowEngine {
    /// Start a new session and run step 1.
    pub async fn start_session(
        &self,
        kind: ToolKind,
        tool: &dyn WorkflowTool,
        request: &WorkflowRequest,
    ) -> Result<SessionStepOutcome, ApiError> {
        let mut args = self.registry.initial_arguments(kind, request)?;
        let session_id = generate_session_id(kind.as_str(), self.clock.now())?;
        args.continuation_id = Some(session_id.clone());
        info!(tool = kind.as_str(), session_id = %session_id, "session started");
        self.run_session_step(kind, tool, &session_id, args).await
    }

    /// Resume `session_id` with the caller's findings for the next step.
    ///
    /// An unknown or expired id fails with `SessionNotFound`; nothing is created under it.
    pub async fn continue_session(
        &self,
        kind: ToolKind,
        tool: &dyn WorkflowTool,
        session_id: &str,
        findings: Option<String>,
    ) -> Result<SessionStepOutcome, ApiError> {
        let record = self
            .sessions
            .load(session_id)?
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
        if record.tool_name != kind.as_str() {
            return Err(ApiError::validation(
                "session",
                session_id,
                format!(
                    "session belongs to '{}', not '{}'",
                    record.tool_name,
                    kind.as_str()
                ),
            ));
        }

        let findings = findings.filter(|f| !f.trim().is_empty());
        let args = record.state.next_arguments(&record.arguments, findings);
        info!(
            tool = kind.as_str(),
            session_id,
            step = args.step_number,
            "session resumed"
        );
        self.run_session_step(kind, tool, session_id, args).await
    }

    async fn run_session_step(
        &self,
        kind: ToolKind,
        tool: &dyn WorkflowTool,
        session_id: &str,
        args: StepArguments,
    ) -> Result<SessionStepOutcome, ApiError> {
        let raw = match tool.execute(&args).await {
            Ok(raw) => raw,
            Err(e) => {
                self.discard_session(session_id);
                return Err(e);
            }
        };

        let mut state = WorkflowState::from_arguments(kind.as_str(), session_id, &args);
        let Some(result) = StepResult::parse(&raw) else {
            state.next_step_required = false;
            self.discard_session(session_id);
            return Ok(self.complete(kind, session_id, state, raw));
        };
        log_step_mismatch(kind, &args, &result);
        state.apply(&result);

        if !state.next_step_required {
            self.discard_session(session_id);
            let content = result
                .display_text()
                .map(str::to_string)
                .unwrap_or_else(|| state.findings.clone());
            info!(tool = kind.as_str(), session_id, "session complete");
            return Ok(self.complete(kind, session_id, state, content));
        }
        if args.step_number as usize > self.settings.max_steps {
            self.discard_session(session_id);
            return Err(self.exceeded(kind));
        }

        let record = match self.sessions.save(session_id, kind.as_str(), &result, &args) {
            Ok(record) => record,
            Err(e) => {
                self.discard_session(session_id);
                return Err(e.into());
            }
        };
        let state = record.state;
        let next_step = state.current_step + 1;
        let content = result
            .display_text()
            .map(str::to_string)
            .unwrap_or_default();

        Ok(SessionStepOutcome {
            session_id: session_id.to_string(),
            tool: kind.as_str().to_string(),
            status: SessionStatus::InProgress,
            step_number: state.current_step,
            total_steps: state.total_steps,
            next_step_required: true,
            content,
            continuation_command: Some(self.continuation_command(kind, session_id)),
            instructions: Some(ContinuationInstructions {
                status: "workflow_incomplete".to_string(),
                message: format!(
                    "Step {} of ~{} finished. The {} workflow is not complete; resume it before \
                     starting other work.",
                    state.current_step,
                    state.total_steps,
                    kind.as_str()
                ),
                next_step,
                required_action: format!(
                    "Investigate as directed, then run the continuation command with your \
                     findings for step {}.",
                    next_step
                ),
            }),
            state,
        })
    }

    /// `<cli> <tool> --session <id> --continue '<findings>'`
    pub fn continuation_command(&self, kind: ToolKind, session_id: &str) -> String {
        format!(
            "{} {} --session {} --continue '<findings>'",
            self.settings.cli_name,
            kind.as_str(),
            session_id
        )
    }

    fn complete(
        &self,
        kind: ToolKind,
        session_id: &str,
        state: WorkflowState,
        content: String,
    ) -> SessionStepOutcome {
        SessionStepOutcome {
            session_id: session_id.to_string(),
            tool: kind.as_str().to_string(),
            status: SessionStatus::Complete,
            step_number: state.current_step,
            total_steps: state.total_steps,
            next_step_required: false,
            content,
            state,
            continuation_command: None,
            instructions: None,
        }
    }

    fn discard_session(&self, session_id: &str) {
        if let Err(e) = self.sessions.delete(session_id) {
            warn!(session_id, error = %e, "failed to delete session record");
        }
    }
}
