//! The seam between the engine and whatever produces step replies.

use crate::error::ApiError;
use crate::workflow::StepArguments;
use async_trait::async_trait;

/// A multi-step tool. `execute` runs one step and returns the raw reply, which is
/// expected to be a JSON object carrying the step fields.
#[async_trait]
pub trait WorkflowTool: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, arguments: &StepArguments) -> Result<String, ApiError>;
}
