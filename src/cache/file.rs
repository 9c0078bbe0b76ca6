//! On-disk response cache bounded by total size.
//!
//! Layout: `{root}/{key[0..2]}/{key}.data` holds the response and `{key}.meta.json`
//! holds its [`CacheEntry`]. Both are written via temp file + rename. The in-memory
//! index is rebuilt from the metadata files on open; entries whose data and metadata
//! disagree are deleted during the rebuild instead of failing startup.

use crate::cache::{CacheEntry, CacheStats, ResponseCache};
use crate::clock::SharedClock;
use crate::error::StorageError;
use crate::storage::file::{atomic_write, remove_if_present};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const DATA_SUFFIX: &str = ".data";
const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone)]
pub struct FileCacheOptions {
    pub max_size_bytes: u64,
    pub default_ttl: Duration,
    /// Fraction of capacity to free whenever eviction runs.
    pub eviction_ratio: f64,
}

impl Default for FileCacheOptions {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024,
            default_ttl: Duration::from_secs(3600),
            eviction_ratio: 0.2,
        }
    }
}

#[derive(Default)]
struct Index {
    entries: HashMap<String, CacheEntry>,
    total_size: u64,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Index {
    fn insert(&mut self, entry: CacheEntry) {
        self.total_size += entry.size_bytes;
        self.next_seq = self.next_seq.max(entry.access_seq);
        if let Some(previous) = self.entries.insert(entry.key.clone(), entry) {
            self.total_size = self.total_size.saturating_sub(previous.size_bytes);
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn least_recent(&self) -> Option<String> {
        self.entries
            .values()
            .min_by_key(|entry| entry.recency())
            .map(|entry| entry.key.clone())
    }
}

pub struct FileResponseCache {
    root: PathBuf,
    clock: SharedClock,
    options: FileCacheOptions,
    index: Mutex<Index>,
}

impl FileResponseCache {
    /// Open the cache at `root`, rebuilding the index from disk.
    pub fn open(
        root: &Path,
        clock: SharedClock,
        options: FileCacheOptions,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(root).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create cache directory {:?}: {}", root, e),
            ))
        })?;
        let cache = Self {
            root: root.to_path_buf(),
            clock,
            options,
            index: Mutex::new(Index::default()),
        };
        cache.rebuild_index();
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, key: &str) -> PathBuf {
        self.root.join(&key[..2])
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.shard_dir(key).join(format!("{}{}", key, DATA_SUFFIX))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.shard_dir(key).join(format!("{}{}", key, META_SUFFIX))
    }

    fn remove_files(&self, key: &str) {
        for path in [self.data_path(key), self.meta_path(key)] {
            if let Err(e) = remove_if_present(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove cache file");
            }
        }
    }

    /// Scan metadata files and keep only consistent, unexpired entries.
    fn rebuild_index(&self) {
        let now = self.clock.now();
        let mut index = Index::default();
        let mut discarded = 0usize;

        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.starts_with('.') {
                // Leftover temp file from an interrupted write.
                let _ = remove_if_present(path);
                continue;
            }
            if let Some(key) = name.strip_suffix(DATA_SUFFIX) {
                if !valid_key(key) || !self.meta_path(key).exists() {
                    let _ = remove_if_present(path);
                    discarded += 1;
                }
                continue;
            }
            let Some(key) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };

            match self.load_entry(key, path) {
                Some(cached) if !cached.is_expired(now) => index.insert(cached),
                Some(_) => self.remove_files(key),
                None => {
                    if valid_key(key) {
                        self.remove_files(key);
                    }
                    let _ = remove_if_present(path);
                    discarded += 1;
                }
            }
        }

        if discarded > 0 {
            debug!(discarded, "discarded inconsistent cache entries");
        }
        info!(
            entries = index.entries.len(),
            total_size_bytes = index.total_size,
            "response cache index rebuilt"
        );
        *self.index.lock() = index;
    }

    /// Metadata for `key`, if it parses and matches its data file.
    fn load_entry(&self, key: &str, meta_path: &Path) -> Option<CacheEntry> {
        if !valid_key(key) {
            return None;
        }
        let raw = fs::read_to_string(meta_path).ok()?;
        let entry: CacheEntry = serde_json::from_str(&raw).ok()?;
        let data_len = fs::metadata(self.data_path(key)).ok()?.len();
        (entry.key == key && entry.size_bytes == data_len).then_some(entry)
    }

    /// Evict least-recently-accessed entries until `required` bytes fit, freeing at
    /// least `eviction_ratio` of capacity in one pass.
    fn make_room(&self, index: &mut Index, required: u64) {
        let cap = self.options.max_size_bytes;
        if index.total_size + required <= cap {
            return;
        }
        let batch = (cap as f64 * self.options.eviction_ratio) as u64;
        let target_free = required.max(batch);
        while cap.saturating_sub(index.total_size) < target_free {
            let Some(key) = index.least_recent() else {
                break;
            };
            index.remove(&key);
            index.evictions += 1;
            self.remove_files(&key);
            debug!(key = %key, "evicted least recently used cache entry");
        }
    }

    fn write_meta(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(entry)?;
        atomic_write(&self.meta_path(&entry.key), &body)
    }
}

/// Keys are used as file names; restrict them to a safe alphabet.
fn valid_key(key: &str) -> bool {
    key.len() >= 2
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_key(key: &str) -> Result<(), StorageError> {
    if valid_key(key) {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(format!("cache key '{}'", key)))
    }
}

impl ResponseCache for FileResponseCache {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        check_key(key)?;
        let now = self.clock.now();
        let mut index = self.index.lock();

        let Some(entry) = index.entries.get(key).cloned() else {
            index.misses += 1;
            return Ok(None);
        };
        if entry.is_expired(now) {
            index.remove(key);
            index.misses += 1;
            self.remove_files(key);
            return Ok(None);
        }

        let data = match fs::read_to_string(self.data_path(key)) {
            Ok(data) if data.len() as u64 == entry.size_bytes => data,
            _ => {
                warn!(key, "cache data missing or inconsistent, dropping entry");
                index.remove(key);
                index.misses += 1;
                self.remove_files(key);
                return Ok(None);
            }
        };

        let seq = index.bump_seq();
        let mut touched = entry;
        touched.touch(now, seq);
        if let Err(e) = self.write_meta(&touched) {
            warn!(key, error = %e, "failed to persist cache access time");
        }
        index.entries.insert(key.to_string(), touched);
        index.hits += 1;
        Ok(Some(data))
    }

    fn set(
        &self,
        key: &str,
        response: &str,
        ttl: Option<Duration>,
        metadata: Map<String, Value>,
    ) -> Result<(), StorageError> {
        check_key(key)?;
        let size = response.len() as u64;
        if size > self.options.max_size_bytes {
            warn!(key, size, "response larger than cache capacity, not cached");
            return Ok(());
        }

        let now = self.clock.now();
        let mut index = self.index.lock();
        if index.remove(key).is_some() {
            self.remove_files(key);
        }
        self.make_room(&mut index, size);

        let seq = index.bump_seq();
        let entry = CacheEntry::new(
            key,
            size,
            now,
            ttl.unwrap_or(self.options.default_ttl),
            seq,
            metadata,
        );
        atomic_write(&self.data_path(key), response.as_bytes())?;
        if let Err(e) = self.write_meta(&entry) {
            remove_if_present(&self.data_path(key))?;
            return Err(e);
        }
        index.insert(entry);
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, StorageError> {
        check_key(key)?;
        let removed = self.index.lock().remove(key).is_some();
        self.remove_files(key);
        Ok(removed)
    }

    fn clear(&self) -> Result<usize, StorageError> {
        let mut index = self.index.lock();
        let keys: Vec<String> = index.entries.keys().cloned().collect();
        for key in &keys {
            index.remove(key);
            self.remove_files(key);
        }
        Ok(keys.len())
    }

    fn stats(&self) -> CacheStats {
        let index = self.index.lock();
        CacheStats {
            backend: "file".to_string(),
            entries: index.entries.len(),
            total_size_bytes: index.total_size,
            max_size_bytes: Some(self.options.max_size_bytes),
            max_entries: None,
            hits: index.hits,
            misses: index.misses,
            evictions: index.evictions,
        }
    }
}
