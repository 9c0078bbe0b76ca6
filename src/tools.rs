//! Concrete workflow tools.
//!
//! A tool configured under `tools.<name>` runs as an external command; every other tool
//! is answered by the configured model provider.

pub mod command;
pub mod provider_tool;

pub use command::{CommandToolConfig, CommandWorkflowTool};
pub use provider_tool::{FileBudget, ProviderWorkflowTool};

use crate::error::ApiError;
use crate::gateway::ProviderGateway;
use crate::workflow::{StepDefaults, WorkflowTool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Pick the implementation for `defaults.kind`. The gateway is only built when needed.
pub fn resolve_tool<G>(
    defaults: &StepDefaults,
    commands: &HashMap<String, CommandToolConfig>,
    workspace_root: &Path,
    use_cache: bool,
    gateway: G,
) -> Result<Box<dyn WorkflowTool>, ApiError>
where
    G: FnOnce() -> Result<Arc<ProviderGateway>, ApiError>,
{
    let name = defaults.kind.as_str();
    if let Some(config) = commands.get(name) {
        return Ok(Box::new(CommandWorkflowTool::new(name, config)?));
    }
    Ok(Box::new(
        ProviderWorkflowTool::new(name, defaults.description, gateway()?, workspace_root)
            .with_cache(use_cache),
    ))
}
