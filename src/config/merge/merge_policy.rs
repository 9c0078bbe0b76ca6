//! Merge rules: defaults applied before any file or environment layer.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only keys whose absence would change section selection are seeded here; every other
/// field falls back to its serde default.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.backend", "file")?
        .set_default("storage.key_prefix", "conduit:")?
        .set_default("cache.backend", "file")?
        .set_default("workflow.cli_name", "conduit")
}
