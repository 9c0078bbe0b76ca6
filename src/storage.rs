//! Key-value storage with per-key expiry.
//!
//! Every backend speaks the same small contract: `get`, `set` (always with an
//! expiry), `delete`, `exists`, `list_keys` and `purge_expired`. Expiry is checked
//! at read time, so the background sweep is only an optimization.

pub mod distributed;
pub mod factory;
pub mod file;
pub mod memory;
pub mod sweep;

pub use factory::{open_storage, BackendKind, OpenedStorage, StorageSettings};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use distributed::RedisStorage;
pub use sweep::{spawn_expiry_sweep, PeriodicTask};

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live for stored values (3 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// Abstract key-value store with TTL.
///
/// Implementations must be safe to share across threads. A `get` or `exists` on an
/// expired key reports it as absent and removes the stale record.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, expiring after `ttl` (or the backend default).
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;

    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Keys matching a glob pattern (`*`, `?`, `[...]`), expired keys excluded.
    fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StorageError>;

    /// Remove every expired record; returns how many were removed.
    fn purge_expired(&self) -> Result<usize, StorageError>;

    fn default_ttl(&self) -> Duration;

    fn backend_name(&self) -> &'static str;
}

pub type SharedStorage = Arc<dyn StorageBackend>;

/// Persisted envelope around a stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredValue {
    pub fn new(key: &str, value: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            created_at: now,
            expires_at: now + crate::clock::to_chrono(ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Compile a glob pattern used by `list_keys`.
pub fn compile_pattern(pattern: &str) -> Result<glob::Pattern, StorageError> {
    glob::Pattern::new(pattern)
        .map_err(|e| StorageError::InvalidKey(format!("{}: {}", pattern, e)))
}

/// Interval for the expiry sweep: a tenth of the default TTL, between 1 second and 5 minutes.
pub fn sweep_interval(default_ttl: Duration) -> Duration {
    (default_ttl / 10).clamp(Duration::from_secs(1), Duration::from_secs(300))
}
