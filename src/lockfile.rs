//! Advisory lock files with stale-holder detection.
//!
//! A lock file records the holder's pid and acquisition time. An existing lock is
//! treated as stale when its holder is no longer alive or when it has outlived
//! `max_age`; stale locks are broken and re-acquired. Liveness checks are
//! platform-dependent and sit behind [`ProcessLiveness`].

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Answers whether a process id refers to a running process.
pub trait ProcessLiveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Linux liveness via `/proc/<pid>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsLiveness;

impl ProcessLiveness for ProcfsLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        Path::new("/proc").join(pid.to_string()).exists()
    }
}

/// Fallback for platforms without a liveness primitive: every holder is presumed dead,
/// so only `max_age` keeps a lock alive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLiveness;

impl ProcessLiveness for NoLiveness {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}

pub fn default_liveness() -> Arc<dyn ProcessLiveness> {
    if cfg!(target_os = "linux") && Path::new("/proc/self").exists() {
        Arc::new(ProcfsLiveness)
    } else {
        Arc::new(NoLiveness)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held lock; the file is removed on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Try to take the lock at `path`, breaking it if the current holder is stale.
    pub fn try_acquire(
        path: &Path,
        max_age: Duration,
        liveness: &dyn ProcessLiveness,
    ) -> Result<Self, StorageError> {
        match Self::create(path) {
            Ok(lock) => return Ok(lock),
            Err(StorageError::IoError(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }

        let holder = read_info(path);
        let stale = match &holder {
            Some(info) => {
                let age = Utc::now() - info.acquired_at;
                !liveness.is_alive(info.pid)
                    || age > crate::clock::to_chrono(max_age)
            }
            // Unreadable or half-written lock file.
            None => true,
        };

        if !stale {
            let pid = holder.map(|info| info.pid).unwrap_or_default();
            debug!(path = %path.display(), pid, "lock held by live process");
            return Err(StorageError::LockHeld {
                path: path.to_path_buf(),
                pid,
            });
        }

        warn!(path = %path.display(), "breaking stale lock");
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::IoError(e)),
        }
        Self::create(path)
    }

    fn create(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        file.write_all(serde_json::to_string(&info)?.as_bytes())?;
        file.sync_all()?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
