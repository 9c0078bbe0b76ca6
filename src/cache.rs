//! Response cache for expensive remote calls.
//!
//! Entries are addressed by [`cache_key`] and carry a TTL checked at read time. The
//! in-memory variant bounds the entry count; the file variant bounds total bytes on disk
//! and evicts least-recently-accessed entries in batches. Both evict by access order,
//! never by creation order.
//!
//! Cache failures are never fatal to a request: callers treat errors as misses.

pub mod file;
pub mod key;
pub mod memory;

pub use file::{FileCacheOptions, FileResponseCache};
pub use key::cache_key;
pub use memory::MemoryResponseCache;

use crate::clock::SharedClock;
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Persisted attributes of one cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u64,
    /// Tie-breaker for entries touched within the same clock tick.
    #[serde(default)]
    pub access_seq: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CacheEntry {
    pub fn new(
        key: &str,
        size_bytes: u64,
        now: DateTime<Utc>,
        ttl: Duration,
        access_seq: u64,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            key: key.to_string(),
            size_bytes,
            created_at: now,
            expires_at: now + crate::clock::to_chrono(ttl),
            accessed_at: now,
            access_count: 0,
            access_seq,
            metadata,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn touch(&mut self, now: DateTime<Utc>, access_seq: u64) {
        self.accessed_at = now;
        self.access_count += 1;
        self.access_seq = access_seq;
    }

    /// Ordering key for LRU eviction: oldest access first.
    pub(crate) fn recency(&self) -> (DateTime<Utc>, u64) {
        (self.accessed_at, self.access_seq)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub backend: String,
    pub entries: usize,
    pub total_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `response` under `key`, replacing any previous entry.
    fn set(
        &self,
        key: &str,
        response: &str,
        ttl: Option<Duration>,
        metadata: Map<String, Value>,
    ) -> Result<(), StorageError>;

    /// Remove one entry; returns whether it existed.
    fn invalidate(&self, key: &str) -> Result<bool, StorageError>;

    /// Remove every entry; returns how many were removed.
    fn clear(&self) -> Result<usize, StorageError>;

    fn stats(&self) -> CacheStats;

    fn lookup(
        &self,
        prompt: &str,
        model: &str,
        params: &Map<String, Value>,
    ) -> Result<Option<String>, StorageError> {
        self.get(&cache_key(prompt, model, params))
    }

    fn store(
        &self,
        prompt: &str,
        model: &str,
        params: &Map<String, Value>,
        response: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let mut metadata = Map::new();
        metadata.insert("model".to_string(), Value::String(model.to_string()));
        self.set(&cache_key(prompt, model, params), response, ttl, metadata)
    }
}

pub type SharedCache = Arc<dyn ResponseCache>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_backend")]
    pub backend: CacheBackendKind,

    /// Cache directory for the file backend (defaults to the user cache dir)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Fraction of capacity freed per eviction pass
    #[serde(default = "default_eviction_ratio")]
    pub eviction_ratio: f64,

    /// Entry bound for the memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_backend() -> CacheBackendKind {
    CacheBackendKind::File
}

fn default_max_size_mb() -> u64 {
    100
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_eviction_ratio() -> f64 {
    0.2
}

fn default_max_entries() -> usize {
    1000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: default_backend(),
            directory: None,
            max_size_mb: default_max_size_mb(),
            ttl_secs: default_ttl_secs(),
            eviction_ratio: default_eviction_ratio(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.eviction_ratio) {
            return Err(format!(
                "eviction_ratio must be between 0.0 and 1.0, got {}",
                self.eviction_ratio
            ));
        }
        if self.max_size_mb == 0 {
            return Err("max_size_mb must be at least 1".to_string());
        }
        if self.max_entries == 0 {
            return Err("max_entries must be at least 1".to_string());
        }
        if self.ttl_secs == 0 {
            return Err("ttl_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Build the configured cache. Returns `None` when caching is disabled; a file cache
/// that cannot be opened degrades to memory.
pub fn open_cache(
    settings: &CacheSettings,
    default_directory: Option<PathBuf>,
    clock: SharedClock,
) -> Option<SharedCache> {
    if !settings.enabled {
        return None;
    }
    let memory = || -> SharedCache {
        Arc::new(MemoryResponseCache::new(
            clock.clone(),
            settings.default_ttl(),
            settings.max_entries,
        ))
    };
    if settings.backend == CacheBackendKind::Memory {
        return Some(memory());
    }

    let Some(directory) = settings.directory.clone().or(default_directory) else {
        warn!("no cache directory available, using in-memory response cache");
        return Some(memory());
    };
    let options = FileCacheOptions {
        max_size_bytes: settings.max_size_mb.saturating_mul(1024 * 1024),
        default_ttl: settings.default_ttl(),
        eviction_ratio: settings.eviction_ratio,
    };
    match FileResponseCache::open(&directory, clock.clone(), options) {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            warn!(error = %e, path = %directory.display(), "file cache unavailable, using in-memory response cache");
            Some(memory())
        }
    }
}
