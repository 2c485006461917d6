//! Durable state for the single active Intent and the archive of past ones.
//!
//! Writes go through a sidecar advisory lock and an atomic rename; reads take
//! no lock and treat anything unparseable as "no active intent".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::Intent;
use crate::atomic::{write_atomic, write_new_atomic};
use crate::config::FailsafePaths;
use crate::lock::{self, LockConfig, LockError, LockGuard};

#[derive(Debug, Error)]
pub enum IntentStoreError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize intent: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("intent {id} is already archived")]
    AlreadyArchived { id: String },

    #[error("invalid intent id: {id:?}")]
    InvalidId { id: String },
}

pub type IntentStoreResult<T> = Result<T, IntentStoreError>;

#[derive(Debug, Clone)]
pub struct IntentStore {
    active_file: PathBuf,
    archive_dir: PathBuf,
    lock: LockConfig,
}

impl IntentStore {
    pub fn new(paths: &FailsafePaths, lock: LockConfig) -> Self {
        Self {
            active_file: paths.active_intent_file(),
            archive_dir: paths.intents_dir(),
            lock,
        }
    }

    pub fn active_intent_path(&self) -> &Path {
        &self.active_file
    }

    /// Current active Intent, or `None` if absent or unreadable.
    pub fn read_active_intent(&self) -> Option<Intent> {
        read_intent(&self.active_file)
    }

    /// Atomically replace the active Intent.
    pub fn save_active_intent(&self, intent: &Intent) -> IntentStoreResult<()> {
        self.lock_active()?.save(intent)
    }

    /// Remove the active Intent. No-op if there is none.
    pub fn delete_active_intent(&self) -> IntentStoreResult<()> {
        self.lock_active()?.delete()
    }

    /// Take exclusive write access to the active Intent.
    ///
    /// Read-modify-write sequences must go through one guard so the value
    /// read is the value replaced.
    pub fn lock_active(&self) -> IntentStoreResult<ActiveIntentGuard<'_>> {
        let lock = lock::acquire(&self.active_file, &self.lock)?;
        Ok(ActiveIntentGuard {
            store: self,
            _lock: lock,
        })
    }

    /// Write an immutable snapshot keyed by intent id.
    pub fn archive_intent(&self, intent: &Intent) -> IntentStoreResult<()> {
        let path = self.archive_path(&intent.id)?;
        let bytes = serde_json::to_vec_pretty(intent)?;
        write_new_atomic(&path, &bytes).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                IntentStoreError::AlreadyArchived {
                    id: intent.id.clone(),
                }
            } else {
                IntentStoreError::Io { path, source }
            }
        })
    }

    pub fn get_archived_intent(&self, id: &str) -> Option<Intent> {
        let path = self.archive_path(id).ok()?;
        read_intent(&path)
    }

    fn archive_path(&self, id: &str) -> IntentStoreResult<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(IntentStoreError::InvalidId { id: id.to_string() });
        }
        Ok(self.archive_dir.join(format!("{id}.json")))
    }
}

/// Exclusive access to the active Intent, released on drop.
#[derive(Debug)]
pub struct ActiveIntentGuard<'a> {
    store: &'a IntentStore,
    _lock: LockGuard,
}

impl ActiveIntentGuard<'_> {
    pub fn current(&self) -> Option<Intent> {
        self.store.read_active_intent()
    }

    pub fn save(&self, intent: &Intent) -> IntentStoreResult<()> {
        let path = &self.store.active_file;
        let bytes = serde_json::to_vec_pretty(intent)?;
        write_atomic(path, &bytes).map_err(|source| IntentStoreError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(intent_id = %intent.id, status = %intent.status, "active intent saved");
        Ok(())
    }

    pub fn delete(&self) -> IntentStoreResult<()> {
        let path = &self.store.active_file;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(IntentStoreError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

fn read_intent(path: &Path) -> Option<Intent> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read intent file");
            return None;
        }
    };
    let intent: Intent = match serde_json::from_str(&text) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt intent file");
            return None;
        }
    };
    if let Err(reason) = intent.validate() {
        tracing::warn!(path = %path.display(), reason = %reason, "ignoring invalid intent file");
        return None;
    }
    Some(intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{IntentMetadata, IntentScope, IntentStatus, IntentType};
    use tempfile::tempdir;

    fn intent() -> Intent {
        Intent::new(
            IntentType::Bugfix,
            "Fix off-by-one in pager",
            IntentScope {
                files: vec!["src/pager.rs".into()],
                ..IntentScope::default()
            },
            IntentMetadata::default(),
        )
    }

    #[test]
    fn test_missing_active_intent_is_none() {
        let dir = tempdir().unwrap();
        let store = IntentStore::new(&FailsafePaths::new(dir.path()), LockConfig::default());
        assert!(store.read_active_intent().is_none());
        // Deleting nothing is fine.
        store.delete_active_intent().unwrap();
    }

    #[test]
    fn test_save_read_delete() {
        let dir = tempdir().unwrap();
        let store = IntentStore::new(&FailsafePaths::new(dir.path()), LockConfig::default());
        let mut active = intent();
        store.save_active_intent(&active).unwrap();
        assert_eq!(store.read_active_intent(), Some(active.clone()));

        active.status = IntentStatus::Pass;
        store.save_active_intent(&active).unwrap();
        assert_eq!(store.read_active_intent().unwrap().status, IntentStatus::Pass);

        store.delete_active_intent().unwrap();
        assert!(store.read_active_intent().is_none());
    }

    #[test]
    fn test_corrupt_active_intent_reads_as_absent() {
        let dir = tempdir().unwrap();
        let store = IntentStore::new(&FailsafePaths::new(dir.path()), LockConfig::default());
        fs::create_dir_all(store.active_intent_path().parent().unwrap()).unwrap();
        fs::write(store.active_intent_path(), "{\"id\": \"abc\", \"status\":").unwrap();
        assert!(store.read_active_intent().is_none());
    }

    #[test]
    fn test_archive_is_write_once() {
        let dir = tempdir().unwrap();
        let store = IntentStore::new(&FailsafePaths::new(dir.path()), LockConfig::default());
        let mut sealed = intent();
        sealed.status = IntentStatus::Sealed;
        store.archive_intent(&sealed).unwrap();

        let err = store.archive_intent(&sealed).unwrap_err();
        assert!(matches!(err, IntentStoreError::AlreadyArchived { .. }));
        assert_eq!(store.get_archived_intent(&sealed.id), Some(sealed));
        assert!(store.get_archived_intent("missing").is_none());
    }

    #[test]
    fn test_guard_blocks_second_writer() {
        let dir = tempdir().unwrap();
        let fast = LockConfig {
            retries: 1,
            min_timeout_ms: 5,
            max_timeout_ms: 5,
            factor: 1,
        };
        let store = IntentStore::new(&FailsafePaths::new(dir.path()), fast);
        let guard = store.lock_active().unwrap();
        guard.save(&intent()).unwrap();

        let err = store.save_active_intent(&intent()).unwrap_err();
        assert!(matches!(err, IntentStoreError::Lock(LockError::Timeout { .. })));
        drop(guard);
        store.save_active_intent(&intent()).unwrap();
    }

    #[test]
    fn test_archive_rejects_path_like_ids() {
        let dir = tempdir().unwrap();
        let store = IntentStore::new(&FailsafePaths::new(dir.path()), LockConfig::default());
        let mut bad = intent();
        bad.id = "../escape".into();
        assert!(matches!(
            store.archive_intent(&bad),
            Err(IntentStoreError::InvalidId { .. })
        ));
        assert!(store.get_archived_intent("../escape").is_none());
    }
}
