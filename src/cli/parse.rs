//! CLI parse: clap types for Conduit. No behavior; definitions only.

use crate::workflow::ToolKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Conduit CLI - route requests across LLM providers and run workflow tools to completion
#[derive(Parser, Debug)]
#[command(name = "conduit", version)]
#[command(about = "Route LLM requests across providers and run multi-step workflow tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format for command results
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging (debug level)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt to a provider
    Chat {
        /// Prompt text
        prompt: String,
        /// Model override
        #[arg(long)]
        model: Option<String>,
        /// Provider name from configuration
        #[arg(long)]
        provider: Option<String>,
        /// Files whose contents are appended to the prompt
        #[arg(long, num_args = 1..)]
        files: Vec<String>,
        /// Skip the response cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Root-cause investigation
    Debug(WorkflowArgs),
    /// Code review
    Codereview(WorkflowArgs),
    /// Security audit
    Secaudit(WorkflowArgs),
    /// Architecture and code analysis
    Analyze(WorkflowArgs),
    /// Refactoring opportunities
    Refactor(WorkflowArgs),
    /// Test generation
    Testgen(WorkflowArgs),
    /// Pre-commit validation of pending changes
    Precommit(WorkflowArgs),
    /// Extended reasoning on a problem
    Thinkdeep(WorkflowArgs),
    /// Step-by-step planning
    Planner(WorkflowArgs),
    /// Inspect or remove in-progress workflow sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

impl Commands {
    /// Workflow tool and its arguments, for the tool subcommands.
    pub fn workflow(&self) -> Option<(ToolKind, &WorkflowArgs)> {
        let pair = match self {
            Commands::Debug(args) => (ToolKind::Debug, args),
            Commands::Codereview(args) => (ToolKind::CodeReview, args),
            Commands::Secaudit(args) => (ToolKind::SecAudit, args),
            Commands::Analyze(args) => (ToolKind::Analyze, args),
            Commands::Refactor(args) => (ToolKind::Refactor, args),
            Commands::Testgen(args) => (ToolKind::TestGen, args),
            Commands::Precommit(args) => (ToolKind::PreCommit, args),
            Commands::Thinkdeep(args) => (ToolKind::ThinkDeep, args),
            Commands::Planner(args) => (ToolKind::Planner, args),
            Commands::Chat { .. } | Commands::Sessions { .. } | Commands::Cache { .. } => {
                return None
            }
        };
        Some(pair)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct WorkflowArgs {
    /// Goal or question for the workflow
    #[arg(required_unless_present = "session")]
    pub prompt: Option<String>,

    /// Files relevant to the investigation
    #[arg(long, num_args = 1..)]
    pub files: Vec<String>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,

    /// Provider name from configuration
    #[arg(long)]
    pub provider: Option<String>,

    /// Starting confidence (exploring, low, medium, high, very_high, almost_certain, certain)
    #[arg(long)]
    pub confidence: Option<String>,

    /// Tool option override as key=value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Step limit for this run
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Run one step at a time and return a continuation command
    #[arg(long, conflicts_with = "session")]
    pub interactive: bool,

    /// Resume an interactive session
    #[arg(long, conflicts_with_all = ["prompt", "files", "set", "confidence"])]
    pub session: Option<String>,

    /// Findings for the next step of a resumed session
    #[arg(long = "continue", value_name = "FINDINGS", requires = "session")]
    pub findings: Option<String>,

    /// Skip the response cache
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List live sessions
    List {
        /// Only sessions of this tool
        #[arg(long)]
        tool: Option<String>,
    },
    /// Show one session's state
    Show { session_id: String },
    /// Delete a session
    Delete { session_id: String },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Stats,
    /// Remove every cached response
    Clear,
}
