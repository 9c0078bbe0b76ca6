//! Process-local storage. Contents are lost when the process exits.

use crate::clock::SharedClock;
use crate::error::StorageError;
use crate::storage::{compile_pattern, StorageBackend, StoredValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub struct MemoryStorage {
    entries: RwLock<HashMap<String, StoredValue>>,
    clock: SharedClock,
    default_ttl: Duration,
}

impl MemoryStorage {
    pub fn new(clock: SharedClock, default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            default_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.value.clone())),
                Some(_) => {}
            }
        }
        // Re-check under the write lock; a concurrent set may have refreshed the key.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|s| s.is_expired(now)) {
            entries.remove(key);
            debug!(key, "expired key removed on read");
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        let stored = StoredValue::new(
            key,
            value,
            self.clock.now(),
            ttl.unwrap_or(self.default_ttl),
        );
        self.entries.write().insert(key.to_string(), stored);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let pattern = compile_pattern(pattern)?;
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .values()
            .filter(|s| !s.is_expired(now) && pattern.matches(&s.key))
            .map(|s| s.key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_expired(now));
        Ok(before - entries.len())
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
