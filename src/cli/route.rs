//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cache::{open_cache, SharedCache};
use crate::cli::parse::{CacheCommands, Commands, OutputFormat, SessionCommands, WorkflowArgs};
use crate::cli::presentation::{
    format_cache_clear, format_cache_stats, format_chat_response, format_session_delete,
    format_session_list, format_session_outcome, format_session_show, format_workflow_summary,
};
use crate::clock::{system_clock, SharedClock};
use crate::config::{paths, ConduitConfig, ConfigLoader};
use crate::error::ApiError;
use crate::gateway::ProviderGateway;
use crate::provider::ChatMessage;
use crate::retry::{Retrier, RetryPolicy};
use crate::session::SessionStore;
use crate::storage::{open_storage, spawn_expiry_sweep, sweep_interval, PeriodicTask, SharedStorage};
use crate::tools::resolve_tool;
use crate::workflow::{
    Confidence, ToolKind, ToolRegistry, WorkflowEngine, WorkflowRequest, WorkflowTool,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Runtime context for CLI execution: loaded configuration plus the shared services
/// every command draws on. Built from the workspace path and an optional config path.
pub struct RunContext {
    config: ConduitConfig,
    workspace_root: PathBuf,
    clock: SharedClock,
    storage: SharedStorage,
    sessions: Arc<SessionStore>,
    cache: Option<SharedCache>,
    registry: Arc<ToolRegistry>,
    runtime: tokio::runtime::Runtime,
    format: OutputFormat,
    _sweep: Option<PeriodicTask>,
}

impl RunContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load_for(&workspace_root, config_path.as_deref())?;
        config.ensure_valid()?;
        let clock = system_clock();

        let opened = open_storage(&config.storage, paths::default_storage_dir(), clock.clone());
        if opened.degraded() {
            warn!(
                requested = ?opened.requested,
                active = ?opened.kind,
                "storage backend degraded"
            );
        }
        let storage = opened.backend;
        let ttl = config.storage.default_ttl();
        let sweep = match spawn_expiry_sweep(storage.clone(), sweep_interval(ttl)) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "failed to start expiry sweep");
                None
            }
        };

        let sessions = Arc::new(SessionStore::new(storage.clone(), clock.clone()).with_ttl(ttl));
        let cache = open_cache(&config.cache, paths::default_cache_dir(), clock.clone());

        let registry = ToolRegistry::builtin();
        registry.validate()?;

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| ApiError::ProviderError(format!("Failed to create runtime: {}", e)))?;

        Ok(Self {
            config,
            workspace_root,
            clock,
            storage,
            sessions,
            cache,
            registry: Arc::new(registry),
            runtime,
            format: OutputFormat::Text,
            _sweep: sweep,
        })
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn config(&self) -> &ConduitConfig {
        &self.config
    }

    /// Execute a command and return its rendered output.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        if let Some((kind, args)) = command.workflow() {
            return self.handle_workflow(kind, args);
        }
        match command {
            Commands::Chat {
                prompt,
                model,
                provider,
                files,
                no_cache,
            } => self.handle_chat(prompt, model.as_deref(), provider.as_deref(), files, !no_cache),
            Commands::Sessions { command } => self.handle_sessions(command),
            Commands::Cache { command } => self.handle_cache(command),
            _ => Err(ApiError::ConfigError("Unhandled command".to_string())),
        }
    }

    fn gateway(&self, provider: Option<&str>, model: Option<&str>) -> Result<Arc<ProviderGateway>, ApiError> {
        let (name, provider_config) = self.config.provider(provider)?;
        let client = provider_config.build_client(model)?;
        info!(provider = name, model = client.model_name(), "provider selected");
        let retrier = Retrier::new(self.config.retry.to_config(), RetryPolicy::default());
        let gateway = ProviderGateway::new(client, self.cache.clone(), retrier)
            .with_default_options(provider_config.default_options.clone())
            .with_cache_ttl(self.config.cache.default_ttl());
        Ok(Arc::new(gateway))
    }

    fn engine(&self, max_steps: Option<usize>) -> WorkflowEngine {
        let engine = WorkflowEngine::new(
            self.registry.clone(),
            self.storage.clone(),
            self.sessions.clone(),
            self.clock.clone(),
            self.config.workflow.clone(),
        );
        match max_steps {
            Some(n) => engine.with_max_steps(n),
            None => engine,
        }
    }

    fn tool(
        &self,
        kind: ToolKind,
        provider: Option<&str>,
        model: Option<&str>,
        use_cache: bool,
    ) -> Result<Box<dyn WorkflowTool>, ApiError> {
        let defaults = self
            .registry
            .get(kind)
            .ok_or_else(|| ApiError::ConfigError(format!("Tool '{}' is not registered", kind)))?;
        resolve_tool(defaults, &self.config.tools, &self.workspace_root, use_cache, || {
            self.gateway(provider, model)
        })
    }

    fn handle_workflow(&self, kind: ToolKind, args: &WorkflowArgs) -> Result<String, ApiError> {
        let engine = self.engine(args.max_steps);
        let use_cache = !args.no_cache;

        if let Some(session_id) = &args.session {
            let record = self
                .sessions
                .load(session_id)?
                .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;
            let provider = args.provider.clone().or(record.arguments.provider.clone());
            let model = args.model.clone().or(record.arguments.model.clone());
            let tool = self.tool(kind, provider.as_deref(), model.as_deref(), use_cache)?;
            let outcome = self.runtime.block_on(engine.continue_session(
                kind,
                tool.as_ref(),
                session_id,
                args.findings.clone(),
            ))?;
            return format_session_outcome(&outcome, self.format);
        }

        let request = build_request(args)?;
        let tool = self.tool(kind, args.provider.as_deref(), args.model.as_deref(), use_cache)?;
        if args.interactive {
            let outcome = self
                .runtime
                .block_on(engine.start_session(kind, tool.as_ref(), &request))?;
            format_session_outcome(&outcome, self.format)
        } else {
            let summary = self
                .runtime
                .block_on(engine.run_batch(kind, tool.as_ref(), &request))?;
            format_workflow_summary(&summary, self.format)
        }
    }

    fn handle_chat(
        &self,
        prompt: &str,
        model: Option<&str>,
        provider: Option<&str>,
        files: &[String],
        use_cache: bool,
    ) -> Result<String, ApiError> {
        let mut text = prompt.to_string();
        for file in files {
            let contents = read_workspace_file(&self.workspace_root, file)?;
            text.push_str(&format!("\n\n--- {} ---\n{}", file, contents));
        }
        let gateway = self.gateway(provider, model)?;
        let response = self.runtime.block_on(gateway.complete(
            vec![ChatMessage::user(text)],
            None,
            use_cache,
        ))?;
        format_chat_response(&response, self.format)
    }

    fn handle_sessions(&self, command: &SessionCommands) -> Result<String, ApiError> {
        match command {
            SessionCommands::List { tool } => {
                if let Some(tool) = tool {
                    ToolKind::from_str(tool)?;
                }
                let sessions = self.sessions.list_active(tool.as_deref())?;
                format_session_list(&sessions, self.format)
            }
            SessionCommands::Show { session_id } => {
                let record = self
                    .sessions
                    .load(session_id)?
                    .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;
                format_session_show(&record, self.format)
            }
            SessionCommands::Delete { session_id } => {
                if self.sessions.load(session_id)?.is_none() {
                    return Err(ApiError::SessionNotFound(session_id.clone()));
                }
                self.sessions.delete(session_id)?;
                format_session_delete(session_id, self.format)
            }
        }
    }

    fn handle_cache(&self, command: &CacheCommands) -> Result<String, ApiError> {
        match command {
            CacheCommands::Stats => {
                let stats = self.cache.as_ref().map(|c| c.stats());
                format_cache_stats(stats.as_ref(), self.format)
            }
            CacheCommands::Clear => {
                let removed = match &self.cache {
                    Some(cache) => Some(cache.clear()?),
                    None => None,
                };
                format_cache_clear(removed, self.format)
            }
        }
    }
}

fn build_request(args: &WorkflowArgs) -> Result<WorkflowRequest, ApiError> {
    let prompt = args
        .prompt
        .clone()
        .ok_or_else(|| ApiError::validation("prompt", "", "a prompt is required to start a workflow"))?;
    let confidence = args
        .confidence
        .as_deref()
        .map(|c| Confidence::from_str(c).map_err(|e| ApiError::validation("confidence", c, e)))
        .transpose()?;

    let mut request = WorkflowRequest::new(prompt);
    request.files = args.files.clone();
    request.model = args.model.clone();
    request.provider = args.provider.clone();
    request.confidence = confidence;
    request.options = parse_overrides(&args.set)?;
    Ok(request)
}

/// `KEY=VALUE` pairs; values parse as JSON when they can, else stay strings.
fn parse_overrides(pairs: &[String]) -> Result<Map<String, Value>, ApiError> {
    let mut options = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| ApiError::validation("set", pair, "expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ApiError::validation("set", pair, "key cannot be empty"));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        options.insert(key.to_string(), value);
    }
    Ok(options)
}

fn read_workspace_file(root: &Path, file: &str) -> Result<String, ApiError> {
    let path = Path::new(file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    std::fs::read_to_string(&path)
        .map_err(|e| ApiError::validation("files", file, format!("cannot read file: {}", e)))
}
