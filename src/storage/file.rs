//! File-backed storage: one JSON document per key under a dedicated directory.
//!
//! Documents are named by the hex-encoded key so any key is filesystem-safe and
//! `list_keys` never has to open a file. Writes go to a temp file that is renamed
//! into place, so readers in other processes never observe a partial document.

use crate::clock::SharedClock;
use crate::error::StorageError;
use crate::lockfile::{default_liveness, LockFile, ProcessLiveness};
use crate::storage::{compile_pattern, StorageBackend, StoredValue};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DOCUMENT_EXTENSION: &str = "json";
const SWEEP_LOCK: &str = ".sweep.lock";

pub struct FileStorage {
    root: PathBuf,
    clock: SharedClock,
    default_ttl: Duration,
    liveness: Arc<dyn ProcessLiveness>,
}

impl FileStorage {
    /// Open (creating if needed) the storage directory at `root`.
    pub fn new<P: AsRef<Path>>(
        root: P,
        clock: SharedClock,
        default_ttl: Duration,
    ) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create storage directory {:?}: {}", root, e),
            ))
        })?;
        Ok(Self {
            root,
            clock,
            default_ttl,
            liveness: default_liveness(),
        })
    }

    pub fn with_liveness(mut self, liveness: Arc<dyn ProcessLiveness>) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(key.as_bytes()), DOCUMENT_EXTENSION))
    }

    /// Read a document; unreadable or corrupt documents are removed and reported absent.
    fn read_document(&self, key: &str, path: &Path) -> Result<Option<StoredValue>, StorageError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::IoError(e)),
        };
        match serde_json::from_str::<StoredValue>(&raw) {
            Ok(stored) if stored.key == key => Ok(Some(stored)),
            Ok(_) | Err(_) => {
                warn!(key, path = %path.display(), "discarding corrupt storage document");
                remove_if_present(path)?;
                Ok(None)
            }
        }
    }

    fn document_keys(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(key) = hex::decode(stem).ok().and_then(|b| String::from_utf8(b).ok()) else {
                continue;
            };
            keys.push((key, path));
        }
        Ok(keys)
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.document_path(key);
        let Some(stored) = self.read_document(key, &path)? else {
            return Ok(None);
        };
        if stored.is_expired(self.clock.now()) {
            debug!(key, "expired key removed on read");
            remove_if_present(&path)?;
            return Ok(None);
        }
        Ok(Some(stored.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        let stored = StoredValue::new(
            key,
            value,
            self.clock.now(),
            ttl.unwrap_or(self.default_ttl),
        );
        let body = serde_json::to_vec_pretty(&stored)?;
        atomic_write(&self.document_path(key), &body)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        remove_if_present(&self.document_path(key))
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let pattern = compile_pattern(pattern)?;
        let now = self.clock.now();
        let mut keys = Vec::new();
        for (key, path) in self.document_keys()? {
            if !pattern.matches(&key) {
                continue;
            }
            match self.read_document(&key, &path)? {
                Some(stored) if !stored.is_expired(now) => keys.push(key),
                _ => {}
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn purge_expired(&self) -> Result<usize, StorageError> {
        let _lock = match LockFile::try_acquire(
            &self.root.join(SWEEP_LOCK),
            Duration::from_secs(600),
            self.liveness.as_ref(),
        ) {
            Ok(lock) => lock,
            Err(StorageError::LockHeld { pid, .. }) => {
                debug!(pid, "another process is sweeping; skipping");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        let mut removed = 0usize;
        for (key, path) in self.document_keys()? {
            match self.read_document(&key, &path)? {
                Some(stored) if stored.is_expired(now) => {
                    remove_if_present(&path)?;
                    removed += 1;
                }
                _ => {}
            }
        }
        Ok(removed)
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Write `body` to a sibling temp file, fsync it, then rename over `path`.
pub(crate) fn atomic_write(path: &Path, body: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::InvalidKey(format!("{:?}", path)))?;
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{}",
        file_name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(body)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to rename temp file to {:?}: {}", path, e),
        ))
    })
}

pub(crate) fn remove_if_present(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::IoError(e)),
    }
}
