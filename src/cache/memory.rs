//! In-process response cache bounded by entry count.

use crate::cache::{CacheEntry, CacheStats, ResponseCache};
use crate::clock::SharedClock;
use crate::error::StorageError;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

struct Inner {
    entries: HashMap<String, (CacheEntry, String)>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct MemoryResponseCache {
    inner: Mutex<Inner>,
    clock: SharedClock,
    default_ttl: Duration,
    max_entries: usize,
}

impl MemoryResponseCache {
    pub fn new(clock: SharedClock, default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            clock,
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }
}

impl Inner {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn evict_lru(&mut self) -> bool {
        let victim = self
            .entries
            .values()
            .min_by_key(|(entry, _)| entry.recency())
            .map(|(entry, _)| entry.key.clone());
        match victim {
            Some(key) => {
                self.entries.remove(&key);
                self.evictions += 1;
                debug!(key = %key, "evicted least recently used cache entry");
                true
            }
            None => false,
        }
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let seq = inner.bump_seq();

        let expired = inner.entries.get(key).map(|(entry, _)| entry.is_expired(now));
        let found = match expired {
            None => None,
            Some(true) => {
                inner.entries.remove(key);
                None
            }
            Some(false) => inner.entries.get_mut(key).map(|(entry, value)| {
                entry.touch(now, seq);
                value.clone()
            }),
        };
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        Ok(found)
    }

    fn set(
        &self,
        key: &str,
        response: &str,
        ttl: Option<Duration>,
        metadata: Map<String, Value>,
    ) -> Result<(), StorageError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = inner.bump_seq();
        inner.entries.remove(key);

        let now_expired: Vec<String> = inner
            .entries
            .values()
            .filter(|(entry, _)| entry.is_expired(now))
            .map(|(entry, _)| entry.key.clone())
            .collect();
        for expired in now_expired {
            inner.entries.remove(&expired);
        }
        while inner.entries.len() >= self.max_entries {
            if !inner.evict_lru() {
                break;
            }
        }

        let entry = CacheEntry::new(
            key,
            response.len() as u64,
            now,
            ttl.unwrap_or(self.default_ttl),
            seq,
            metadata,
        );
        inner
            .entries
            .insert(key.to_string(), (entry, response.to_string()));
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.inner.lock().entries.remove(key).is_some())
    }

    fn clear(&self) -> Result<usize, StorageError> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            backend: "memory".to_string(),
            entries: inner.entries.len(),
            total_size_bytes: inner.entries.values().map(|(e, _)| e.size_bytes).sum(),
            max_size_bytes: None,
            max_entries: Some(self.max_entries),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}
