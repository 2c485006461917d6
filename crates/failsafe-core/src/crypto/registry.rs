//! Injectable key and nonce stores.
//!
//! Both traits expose a small get/put/contains capability so a deployment can
//! swap the in-memory defaults for a shared persistent store.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{AgentKeyRecord, CryptoResult};

/// Registry of agent signing keys, keyed by DID.
pub trait KeyRegistry: Send + Sync {
    fn get(&self, did: &str) -> CryptoResult<Option<AgentKeyRecord>>;

    /// Insert or overwrite the record for `record.did`.
    fn put(&self, record: AgentKeyRecord) -> CryptoResult<()>;

    fn contains(&self, did: &str) -> CryptoResult<bool> {
        Ok(self.get(did)?.is_some())
    }

    /// Mark a key revoked. Returns `false` if the DID is unknown.
    ///
    /// Implementations keep the earliest revocation time.
    fn revoke(&self, did: &str, at: DateTime<Utc>) -> CryptoResult<bool>;
}

/// Set of consumed envelope nonces, scoped per signer.
pub trait NonceStore: Send + Sync {
    fn contains(&self, signer_did: &str, nonce: &str) -> CryptoResult<bool>;

    /// Record a nonce as consumed. Returns `false` if it was already present,
    /// which callers must treat as a replay.
    fn put(&self, signer_did: &str, nonce: &str, signed_at: DateTime<Utc>) -> CryptoResult<bool>;

    /// Drop nonces whose envelope was signed before `cutoff`.
    fn evict_before(&self, cutoff: DateTime<Utc>) -> CryptoResult<usize>;
}

/// Process-local key registry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyRegistry {
    inner: Arc<RwLock<HashMap<String, AgentKeyRecord>>>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyRegistry for InMemoryKeyRegistry {
    fn get(&self, did: &str) -> CryptoResult<Option<AgentKeyRecord>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(did).cloned())
    }

    fn put(&self, record: AgentKeyRecord) -> CryptoResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(record.did.clone(), record);
        Ok(())
    }

    fn revoke(&self, did: &str, at: DateTime<Utc>) -> CryptoResult<bool> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match guard.get_mut(did) {
            Some(record) => {
                record.revoked_at.get_or_insert(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Process-local nonce set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNonceStore {
    inner: Arc<RwLock<HashMap<(String, String), DateTime<Utc>>>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NonceStore for InMemoryNonceStore {
    fn contains(&self, signer_did: &str, nonce: &str) -> CryptoResult<bool> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.contains_key(&(signer_did.to_string(), nonce.to_string())))
    }

    fn put(&self, signer_did: &str, nonce: &str, signed_at: DateTime<Utc>) -> CryptoResult<bool> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let key = (signer_did.to_string(), nonce.to_string());
        if guard.contains_key(&key) {
            return Ok(false);
        }
        guard.insert(key, signed_at);
        Ok(true)
    }

    fn evict_before(&self, cutoff: DateTime<Utc>) -> CryptoResult<usize> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, signed_at| *signed_at >= cutoff);
        Ok(before - guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Persona;
    use chrono::Duration;

    #[test]
    fn test_revocation_keeps_first_timestamp() {
        let registry = InMemoryKeyRegistry::new();
        let record = AgentKeyRecord::new(Persona::Judge, "00ff");
        let did = record.did.clone();
        registry.put(record).unwrap();

        let first = Utc::now() - Duration::hours(1);
        assert!(registry.revoke(&did, first).unwrap());
        assert!(registry.revoke(&did, Utc::now()).unwrap());

        let stored = registry.get(&did).unwrap().unwrap();
        assert_eq!(stored.revoked_at, Some(first));
    }

    #[test]
    fn test_revoke_unknown_did() {
        let registry = InMemoryKeyRegistry::new();
        assert!(!registry.revoke("did:myth:judge:nope", Utc::now()).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_nonce_put_is_single_use_per_signer() {
        let store = InMemoryNonceStore::new();
        let now = Utc::now();
        assert!(store.put("did:a", "n1", now).unwrap());
        assert!(!store.put("did:a", "n1", now).unwrap());
        // Same nonce under another signer is independent.
        assert!(store.put("did:b", "n1", now).unwrap());
        assert!(store.contains("did:a", "n1").unwrap());
        assert!(!store.contains("did:a", "n2").unwrap());
    }

    #[test]
    fn test_nonce_eviction_by_signed_at() {
        let store = InMemoryNonceStore::new();
        let now = Utc::now();
        store.put("did:a", "old", now - Duration::minutes(10)).unwrap();
        store.put("did:a", "fresh", now).unwrap();

        let evicted = store.evict_before(now - Duration::minutes(5)).unwrap();
        assert_eq!(evicted, 1);
        assert!(!store.contains("did:a", "old").unwrap());
        assert!(store.contains("did:a", "fresh").unwrap());
    }
}
