//! Config loading facade: defaults, global file, workspace files, then environment.

use crate::config::merge::merge_policy::builder_with_defaults;
use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::ConduitConfig;
use crate::error::ApiError;
use config::{File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Names the workspace overlay file `.conduit/{CONDUIT_ENV}.toml`.
pub const ENV_NAME_VAR: &str = "CONDUIT_ENV";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<ConduitConfig, ApiError> {
        let env_name = std::env::var(ENV_NAME_VAR).ok();
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root, env_name.as_deref())?;
        let builder = environment::add_to_builder(builder);

        let mut config: ConduitConfig = builder.build()?.try_deserialize()?;
        config.resolve_api_keys(|name| std::env::var(name).ok());
        debug!(
            workspace = %workspace_root.display(),
            providers = config.providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load from one explicit file; the environment still overrides it.
    pub fn load_from_file(path: &Path) -> Result<ConduitConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml).required(true));
        let builder = environment::add_to_builder(builder);

        let mut config: ConduitConfig = builder.build()?.try_deserialize()?;
        config.resolve_api_keys(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// `--config` wins over the layered workspace lookup.
    pub fn load_for(workspace_root: &Path, config_path: Option<&Path>) -> Result<ConduitConfig, ApiError> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(workspace_root),
        }
    }
}
