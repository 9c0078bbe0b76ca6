//! Backend selection with graceful degradation.
//!
//! The preferred backend is opened first; if it cannot be initialized the chain
//! falls back redis → file → memory, logging each downgrade. An unreachable or
//! misconfigured backend never fails the command, it only weakens persistence.

use crate::clock::SharedClock;
use crate::error::StorageError;
use crate::storage::{FileStorage, MemoryStorage, RedisStorage, SharedStorage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    File,
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::File => "file",
            BackendKind::Redis => "redis",
        };
        f.write_str(name)
    }
}

/// Resolved storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Directory for the file backend (defaults to the user data dir)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Default time-to-live for stored state, in hours
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

fn default_backend() -> BackendKind {
    BackendKind::File
}

fn default_key_prefix() -> String {
    "conduit:".to_string()
}

fn default_ttl_hours() -> u64 {
    3
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            directory: None,
            redis_url: None,
            key_prefix: default_key_prefix(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl StorageSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.max(1) * 60 * 60)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_hours == 0 {
            return Err("ttl_hours must be at least 1".to_string());
        }
        if self.backend == BackendKind::Redis && self.redis_url.is_none() {
            return Err("redis backend requires redis_url".to_string());
        }
        Ok(())
    }
}

/// The backend actually in use, which may differ from the configured one.
pub struct OpenedStorage {
    pub backend: SharedStorage,
    pub kind: BackendKind,
    pub requested: BackendKind,
}

impl OpenedStorage {
    pub fn degraded(&self) -> bool {
        self.kind != self.requested
    }
}

/// Open the configured backend, falling back redis → file → memory.
///
/// `default_directory` is used by the file backend when the settings carry none.
pub fn open_storage(
    settings: &StorageSettings,
    default_directory: Option<PathBuf>,
    clock: SharedClock,
) -> OpenedStorage {
    let ttl = settings.default_ttl();
    let requested = settings.backend;

    if requested == BackendKind::Redis {
        match open_redis(settings, clock.clone(), ttl) {
            Ok(backend) => {
                info!(backend = "redis", "storage initialized");
                return OpenedStorage {
                    backend,
                    kind: BackendKind::Redis,
                    requested,
                };
            }
            Err(e) => warn!(error = %e, "redis storage unavailable, falling back to file storage"),
        }
    }

    if requested != BackendKind::Memory {
        match open_file(settings, default_directory, clock.clone(), ttl) {
            Ok(backend) => {
                info!(backend = "file", "storage initialized");
                return OpenedStorage {
                    backend,
                    kind: BackendKind::File,
                    requested,
                };
            }
            Err(e) => warn!(error = %e, "file storage unavailable, falling back to memory storage"),
        }
    }

    info!(backend = "memory", "storage initialized");
    OpenedStorage {
        backend: Arc::new(MemoryStorage::new(clock, ttl)),
        kind: BackendKind::Memory,
        requested,
    }
}

fn open_redis(
    settings: &StorageSettings,
    clock: SharedClock,
    ttl: Duration,
) -> Result<SharedStorage, StorageError> {
    let url = settings
        .redis_url
        .as_deref()
        .ok_or_else(|| StorageError::Backend("redis_url is not configured".to_string()))?;
    Ok(Arc::new(RedisStorage::connect(
        url,
        &settings.key_prefix,
        clock,
        ttl,
    )?))
}

fn open_file(
    settings: &StorageSettings,
    default_directory: Option<PathBuf>,
    clock: SharedClock,
    ttl: Duration,
) -> Result<SharedStorage, StorageError> {
    let directory = settings
        .directory
        .clone()
        .or(default_directory)
        .ok_or_else(|| StorageError::Backend("no storage directory available".to_string()))?;
    Ok(Arc::new(FileStorage::new(directory, clock, ttl)?))
}
