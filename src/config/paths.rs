//! Platform directories for configuration, session storage and the response cache.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "conduit")
}

pub fn global_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default directory for file-backed session storage.
pub fn default_storage_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("conversations"))
}

/// Default directory for the file response cache.
pub fn default_cache_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().join("responses"))
}
