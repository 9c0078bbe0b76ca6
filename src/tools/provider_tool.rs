//! LLM-backed workflow tool.
//!
//! Renders one step's arguments, plus the contents of the files under investigation,
//! into a prompt and returns the model's raw reply. The engine parses the reply; this
//! tool never interprets it.

use crate::error::ApiError;
use crate::gateway::ProviderGateway;
use crate::provider::ChatMessage;
use crate::workflow::{Confidence, StepArguments, WorkflowTool};
use async_trait::async_trait;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-file and total budgets for embedded file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileBudget {
    pub per_file_bytes: usize,
    pub total_bytes: usize,
}

impl Default for FileBudget {
    fn default() -> Self {
        Self {
            per_file_bytes: 64 * 1024,
            total_bytes: 256 * 1024,
        }
    }
}

pub struct ProviderWorkflowTool {
    name: String,
    description: String,
    gateway: Arc<ProviderGateway>,
    workspace_root: PathBuf,
    budget: FileBudget,
    use_cache: bool,
}

impl ProviderWorkflowTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        gateway: Arc<ProviderGateway>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            gateway,
            workspace_root: workspace_root.into(),
            budget: FileBudget::default(),
            use_cache: true,
        }
    }

    pub fn with_budget(mut self, budget: FileBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    fn system_prompt(&self) -> String {
        let levels: Vec<&str> = Confidence::ALL.iter().map(|c| c.as_str()).collect();
        format!(
            "You are the '{name}' workflow tool: {description}\n\
             You work in numbered steps. Each reply must be one JSON object with the fields \
             step_number, total_steps, next_step_required, findings, files_checked, \
             relevant_files, relevant_context, issues_found (objects with severity and \
             description), hypotheses and confidence (one of: {levels}). \
             Set next_step_required to false once the investigation is complete, and put the \
             final answer in a content field on that last step.",
            name = self.name,
            description = self.description,
            levels = levels.join(", "),
        )
    }

    fn user_prompt(&self, arguments: &StepArguments) -> Result<String, ApiError> {
        let args = serde_json::to_string_pretty(arguments).map_err(|e| ApiError::ToolFailed {
            tool: self.name.clone(),
            message: format!("Failed to encode arguments: {}", e),
        })?;
        let mut prompt = format!("Step arguments:\n{}\n", args);

        let mut remaining = self.budget.total_bytes;
        for file in &arguments.relevant_files {
            if remaining == 0 {
                debug!(tool = %self.name, file = %file, "file budget exhausted");
                break;
            }
            let path = self.resolve(file);
            let limit = remaining.min(self.budget.per_file_bytes);
            match read_prefix(&path, limit) {
                Ok((text, truncated)) => {
                    remaining = remaining.saturating_sub(text.len());
                    prompt.push_str(&format!("\n--- {} ---\n{}\n", file, text));
                    if truncated {
                        prompt.push_str("[truncated]\n");
                    }
                }
                Err(e) => warn!(tool = %self.name, file = %file, error = %e, "could not read file"),
            }
        }
        Ok(prompt)
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

/// Read at most `limit` bytes of `path` as lossy UTF-8; the flag reports truncation.
fn read_prefix(path: &Path, limit: usize) -> std::io::Result<(String, bool)> {
    let mut buf = Vec::new();
    File::open(path)?
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)?;
    let truncated = buf.len() > limit;
    buf.truncate(limit);
    Ok((String::from_utf8_lossy(&buf).into_owned(), truncated))
}

#[async_trait]
impl WorkflowTool for ProviderWorkflowTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, arguments: &StepArguments) -> Result<String, ApiError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(self.user_prompt(arguments)?),
        ];
        let reply = self.gateway.complete(messages, None, self.use_cache).await?;
        debug!(
            tool = %self.name,
            step = arguments.step_number,
            cached = reply.cached,
            "workflow step completed by provider"
        );
        Ok(reply.content)
    }
}
