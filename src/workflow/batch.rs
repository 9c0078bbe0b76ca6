//! Batch mode: run every step of a workflow inside one invocation.

use crate::error::ApiError;
use crate::session::random_hex;
use crate::workflow::{
    Confidence, Issue, StepArguments, StepResult, ToolKind, WorkflowEngine, WorkflowRequest,
    WorkflowState, WorkflowTool,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Findings reported by one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFinding {
    pub step_number: u32,
    pub findings: String,
}

/// Consolidated result of a completed batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub tool: String,
    pub workflow_complete: bool,
    pub total_steps_executed: usize,
    pub total_steps: u32,
    pub final_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_confidence: Option<Confidence>,
    /// False when the last reply was not structured and was taken verbatim.
    pub structured: bool,
    pub step_findings: Vec<StepFinding>,
    pub files_checked: Vec<String>,
    pub relevant_files: Vec<String>,
    pub relevant_context: Vec<String>,
    pub issues_found: Vec<Issue>,
    pub hypotheses: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl WorkflowEngine {
    /// Run `tool` from step 1 until it reports completion.
    ///
    /// The tool is invoked at most `max_steps + 1` times: if it still asks for another
    /// step after that many invocations the run fails with `WorkflowExceeded`.
    pub async fn run_batch(
        &self,
        kind: ToolKind,
        tool: &dyn WorkflowTool,
        request: &WorkflowRequest,
    ) -> Result<WorkflowSummary, ApiError> {
        let mut args = self.registry.initial_arguments(kind, request)?;
        let continuation_id = format!("batch_{}_{}", self.clock.now().timestamp(), random_hex(4)?);
        args.continuation_id = Some(continuation_id.clone());

        let mut state = WorkflowState::from_arguments(kind.as_str(), &continuation_id, &args);
        self.states.save(&state)?;
        info!(
            tool = kind.as_str(),
            continuation_id = %continuation_id,
            max_steps = self.settings.max_steps,
            "batch workflow started"
        );

        let outcome = self.drive(kind, tool, &mut state, &mut args).await;
        if let Err(e) = self.states.delete(kind.as_str(), &continuation_id) {
            warn!(continuation_id = %continuation_id, error = %e, "failed to remove batch state");
        }

        match &outcome {
            Ok(summary) => info!(
                tool = kind.as_str(),
                steps = summary.total_steps_executed,
                "batch workflow complete"
            ),
            Err(e) => warn!(tool = kind.as_str(), error = %e, "batch workflow failed"),
        }
        outcome
    }

    async fn drive(
        &self,
        kind: ToolKind,
        tool: &dyn WorkflowTool,
        state: &mut WorkflowState,
        args: &mut StepArguments,
    ) -> Result<WorkflowSummary, ApiError> {
        let mut step_findings = Vec::new();
        let mut invocations = 0usize;

        loop {
            invocations += 1;
            state.begin_step(args);
            debug!(tool = kind.as_str(), step = args.step_number, "executing step");
            let raw = tool.execute(args).await?;

            let Some(result) = StepResult::parse(&raw) else {
                debug!(tool = kind.as_str(), step = args.step_number, "unstructured reply ends workflow");
                state.next_step_required = false;
                return Ok(summarize(kind, state, step_findings, invocations, raw, false));
            };

            log_step_mismatch(kind, args, &result);
            state.apply(&result);
            if let Some(findings) = result.findings.as_ref().filter(|f| !f.trim().is_empty()) {
                step_findings.push(StepFinding {
                    step_number: state.current_step,
                    findings: findings.clone(),
                });
            }

            if !state.next_step_required {
                let content = result
                    .display_text()
                    .map(str::to_string)
                    .unwrap_or_else(|| state.findings.clone());
                return Ok(summarize(kind, state, step_findings, invocations, content, true));
            }
            if invocations > self.settings.max_steps {
                return Err(self.exceeded(kind));
            }

            self.states.save(state)?;
            *args = state.next_arguments(args, None);
        }
    }
}

pub(crate) fn log_step_mismatch(kind: ToolKind, args: &StepArguments, result: &StepResult) {
    if let Some(reported) = result.step_number.filter(|n| *n != args.step_number) {
        debug!(
            tool = kind.as_str(),
            step = args.step_number,
            reported,
            "tool reported a different step number; keeping the engine's"
        );
    }
}

fn summarize(
    kind: ToolKind,
    state: &WorkflowState,
    step_findings: Vec<StepFinding>,
    invocations: usize,
    final_content: String,
    structured: bool,
) -> WorkflowSummary {
    WorkflowSummary {
        tool: kind.as_str().to_string(),
        workflow_complete: true,
        total_steps_executed: invocations,
        total_steps: state.total_steps,
        final_content,
        final_confidence: state.confidence,
        structured,
        step_findings,
        files_checked: state.files_checked.clone(),
        relevant_files: state.relevant_files.clone(),
        relevant_context: state.relevant_context.clone(),
        issues_found: state.issues_found.clone(),
        hypotheses: state.hypotheses.clone(),
        metadata: state.metadata.clone(),
    }
}
