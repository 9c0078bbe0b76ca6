//! Configuration System
//!
//! Layered configuration (defaults, global file, workspace files, environment) resolved
//! once at startup. Everything below the CLI receives these already-resolved values;
//! this module is the only reader of the process environment.

use crate::cache::CacheSettings;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::retry::RetrySettings;
use crate::storage::StorageSettings;
use crate::tools::CommandToolConfig;
use crate::workflow::{ToolKind, WorkflowSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
pub mod paths;
mod sources;

pub use facade::{ConfigLoader, ENV_NAME_VAR};
pub use sources::environment::ENV_PREFIX;
pub use sources::workspace_file::WORKSPACE_CONFIG_DIR;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConduitConfig {
    /// Model provider configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Provider used when a command does not name one
    #[serde(default)]
    pub default_provider: Option<String>,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub workflow: WorkflowSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Workflow tools answered by an external command instead of a provider
    #[serde(default)]
    pub tools: HashMap<String, CommandToolConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Provider(String, String),
    Tool(String, String),
    Section(&'static str, String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Tool(name, msg) => write!(f, "Tool '{}': {}", name, msg),
            ValidationError::Section(section, msg) => write!(f, "[{}]: {}", section, msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ConduitConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (name, provider) in &self.providers {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(name.clone(), e));
            }
        }

        if let Some(default) = &self.default_provider {
            if !self.providers.contains_key(default) {
                errors.push(ValidationError::Section(
                    "default_provider",
                    format!("'{}' is not a configured provider", default),
                ));
            }
        }

        for (name, tool) in &self.tools {
            if ToolKind::from_str(name).is_err() {
                errors.push(ValidationError::Tool(name.clone(), "unknown workflow tool".to_string()));
            }
            if let Err(e) = tool.validate() {
                errors.push(ValidationError::Tool(name.clone(), e));
            }
        }

        let sections = [
            ("storage", self.storage.validate()),
            ("cache", self.cache.validate()),
            ("workflow", self.workflow.validate()),
            ("retry", self.retry.validate()),
        ];
        for (section, result) in sections {
            if let Err(e) = result {
                errors.push(ValidationError::Section(section, e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `validate`, folded into a single `ApiError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }

    /// Resolve which provider to use: the named one, the configured default, or the only
    /// one configured.
    pub fn provider(&self, name: Option<&str>) -> Result<(&str, &ProviderConfig), ApiError> {
        let wanted = name.or(self.default_provider.as_deref());
        match wanted {
            Some(wanted) => self
                .providers
                .get_key_value(wanted)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| {
                    let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
                    known.sort_unstable();
                    ApiError::ConfigError(format!(
                        "Provider '{}' is not configured (known: {})",
                        wanted,
                        if known.is_empty() { "none".to_string() } else { known.join(", ") }
                    ))
                }),
            None if self.providers.len() == 1 => self
                .providers
                .iter()
                .next()
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| ApiError::ConfigError("No providers configured".to_string())),
            None if self.providers.is_empty() => Err(ApiError::ConfigError(
                "No providers configured; add a [providers.<name>] section".to_string(),
            )),
            None => Err(ApiError::ConfigError(
                "Several providers are configured; set default_provider or pass --provider"
                    .to_string(),
            )),
        }
    }

    /// Fill missing provider api keys from each provider type's conventional variable.
    pub(crate) fn resolve_api_keys<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for provider in self.providers.values_mut() {
            if provider.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                provider.api_key = provider
                    .provider_type
                    .api_key_env()
                    .and_then(&lookup)
                    .filter(|key| !key.trim().is_empty());
            }
        }
    }
}
