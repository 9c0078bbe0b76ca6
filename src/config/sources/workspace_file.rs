//! Workspace config file source: `.conduit/config.toml` and `.conduit/{CONDUIT_ENV}.toml`

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::{File, FileFormat};
use std::path::Path;

pub const WORKSPACE_CONFIG_DIR: &str = ".conduit";

/// Add workspace config files to builder.
/// Precedence: `.conduit/config.toml` (base) then `.conduit/{env}.toml` when `env` is set.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
    env_name: Option<&str>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = workspace_root.join(WORKSPACE_CONFIG_DIR);

    let base_config_path = config_dir.join("config.toml");
    if base_config_path.exists() {
        builder = builder
            .add_source(File::from(base_config_path).format(FileFormat::Toml).required(false));
    }

    if let Some(env_name) = env_name.filter(|name| !name.trim().is_empty()) {
        let env_config_path = config_dir.join(format!("{}.toml", env_name));
        if env_config_path.exists() {
            builder = builder
                .add_source(File::from(env_config_path).format(FileFormat::Toml).required(false));
        }
    }

    Ok(builder)
}
