//! Workflow tool backed by an external command.
//!
//! The step arguments are written to the child's stdin as one JSON document and the
//! step result is read from stdout. A hard timeout kills the child and drains its pipes
//! before the timeout is reported, so no process outlives the call.

use crate::error::ApiError;
use crate::workflow::{StepArguments, WorkflowTool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandToolConfig {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl CommandToolConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self.command.first() {
            None => Err("command cannot be empty".to_string()),
            Some(program) if program.trim().is_empty() => {
                Err("command program cannot be blank".to_string())
            }
            _ if self.timeout_secs == 0 => Err("timeout_secs must be at least 1".to_string()),
            _ => Ok(()),
        }
    }
}

pub struct CommandWorkflowTool {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandWorkflowTool {
    pub fn new(name: impl Into<String>, config: &CommandToolConfig) -> Result<Self, ApiError> {
        let name = name.into();
        config
            .validate()
            .map_err(|msg| ApiError::validation(format!("tools.{}.command", name), "", msg))?;
        let mut parts = config.command.iter().cloned();
        let program = parts.next().unwrap_or_default();
        Ok(Self {
            name,
            program,
            args: parts.collect(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn failed(&self, message: impl Into<String>) -> ApiError {
        ApiError::ToolFailed {
            tool: self.name.clone(),
            message: message.into(),
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(handle: JoinHandle<io::Result<Vec<u8>>>) -> Vec<u8> {
    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(Ok(Ok(buf))) => buf,
        _ => Vec::new(),
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text.len().saturating_sub(STDERR_TAIL_BYTES);
    let start = (start..=text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(text.len());
    text[start..].to_string()
}

#[async_trait]
impl WorkflowTool for CommandWorkflowTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, arguments: &StepArguments) -> Result<String, ApiError> {
        let payload = serde_json::to_vec(arguments)
            .map_err(|e| self.failed(format!("Failed to encode arguments: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failed(format!("Failed to spawn '{}': {}", self.program, e)))?;
        debug!(tool = %self.name, pid = ?child.id(), step = arguments.step_number, "tool process spawned");

        let stdin = child.stdin.take();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&payload).await {
                    Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
                stdin.shutdown().await.ok();
            }
            Ok::<(), io::Error>(())
        });
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| self.failed(format!("Failed to wait for process: {}", e)))?,
            Err(_) => {
                warn!(tool = %self.name, timeout_secs = self.timeout.as_secs(), "tool process timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(tool = %self.name, error = %e, "failed to kill tool process");
                }
                writer.abort();
                collect(stdout).await;
                collect(stderr).await;
                return Err(ApiError::Timeout(format!(
                    "Tool '{}' did not finish within {}s",
                    self.name,
                    self.timeout.as_secs()
                )));
            }
        };

        if let Ok(Ok(Err(e))) = tokio::time::timeout(DRAIN_TIMEOUT, writer).await {
            warn!(tool = %self.name, error = %e, "failed to write arguments to tool process");
        }
        let out = collect(stdout).await;
        let err = collect(stderr).await;

        if !status.success() {
            return Err(self.failed(format!("exited with {}: {}", status, tail(&err))));
        }
        String::from_utf8(out).map_err(|_| self.failed("output is not valid UTF-8"))
    }
}
