//! Scoped cross-process exclusive access with bounded retry.
//!
//! A resource is locked through a `<name>.lock` sidecar next to it, so the
//! lock survives the resource itself being replaced by an atomic rename or
//! not existing yet. The OS releases the advisory lock when the holder exits,
//! so a crashed writer never leaves a stale lock behind.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LOCK_RETRIES: u32 = 5;
pub const DEFAULT_MIN_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out acquiring lock on {} after {attempts} attempts", path.display())]
    Timeout { path: PathBuf, attempts: u32 },

    #[error("lock i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Retry schedule for lock acquisition.
///
/// Retry `n` (0-based) waits `min_timeout_ms * factor^n`, capped at
/// `max_timeout_ms`. Total attempts are `retries + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub retries: u32,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub factor: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_LOCK_RETRIES,
            min_timeout_ms: DEFAULT_MIN_TIMEOUT_MS,
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
            factor: 2,
        }
    }
}

impl LockConfig {
    pub fn backoff(&self, retry: u32) -> Duration {
        let multiplier = u64::from(self.factor.max(1)).saturating_pow(retry);
        let millis = self
            .min_timeout_ms
            .saturating_mul(multiplier)
            .min(self.max_timeout_ms.max(self.min_timeout_ms));
        Duration::from_millis(millis)
    }
}

/// Held exclusive access to a resource. Dropping the guard releases it.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn lock_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

/// Sidecar lock file used for `resource`.
pub fn lock_path_for(resource: &Path) -> PathBuf {
    let mut name = resource
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("resource"));
    name.push(".lock");
    resource.with_file_name(name)
}

/// Acquire exclusive access to `resource`, retrying per `config`.
pub fn acquire(resource: &Path, config: &LockConfig) -> Result<LockGuard, LockError> {
    let path = lock_path_for(resource);
    let io_err = |source: io::Error| LockError::Io {
        path: path.clone(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(io_err)?;

    let mut retry = 0;
    loop {
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => return Ok(LockGuard { file, path }),
            Err(e) if is_contended(&e) => {
                if retry >= config.retries {
                    tracing::error!(
                        path = %path.display(),
                        attempts = retry + 1,
                        "lock acquisition exhausted retries"
                    );
                    return Err(LockError::Timeout {
                        path,
                        attempts: retry + 1,
                    });
                }
                let delay = config.backoff(retry);
                tracing::debug!(
                    path = %path.display(),
                    retry = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    "lock busy, retrying"
                );
                thread::sleep(delay);
                retry += 1;
            }
            Err(source) => return Err(LockError::Io { path, source }),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
