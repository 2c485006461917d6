//! SQLite-backed key registry and nonce store.
//!
//! Point several [`CryptoService`](failsafe_core::crypto::CryptoService)
//! instances, in one process or many, at the same database file and replay
//! protection covers all of them. Nonce insertion is a single
//! `INSERT OR IGNORE`, so two verifiers racing on one envelope cannot both
//! consume it.

use chrono::{DateTime, Utc};
use failsafe_core::clock::format_timestamp;
use failsafe_core::crypto::{AgentKeyRecord, CryptoError, CryptoResult, KeyRegistry, NonceStore};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::db;
use crate::error::LedgerResult;

const REPLAY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agent_keys (
    did TEXT PRIMARY KEY,
    public_key_hex TEXT NOT NULL,
    persona TEXT NOT NULL,
    registered_at TEXT NOT NULL,
    revoked_at TEXT
);
CREATE TABLE IF NOT EXISTS used_nonces (
    signer_did TEXT NOT NULL,
    nonce TEXT NOT NULL,
    signed_at TEXT NOT NULL,
    PRIMARY KEY (signer_did, nonce)
);
CREATE INDEX IF NOT EXISTS idx_used_nonces_signed_at ON used_nonces(signed_at);
";

fn store_err(e: impl std::fmt::Display) -> CryptoError {
    CryptoError::Store(e.to_string())
}

fn shared(conn: Connection) -> LedgerResult<Arc<Mutex<Connection>>> {
    conn.execute_batch(REPLAY_SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Open both stores over one database file.
pub fn open_replay_stores(path: &Path) -> LedgerResult<(SqliteKeyRegistry, SqliteNonceStore)> {
    let conn = shared(db::open(path)?)?;
    Ok((
        SqliteKeyRegistry { conn: conn.clone() },
        SqliteNonceStore { conn },
    ))
}

#[derive(Clone)]
pub struct SqliteKeyRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyRegistry {
    pub fn open(path: &Path) -> LedgerResult<Self> {
        Ok(Self {
            conn: shared(db::open(path)?)?,
        })
    }

    pub fn memory() -> LedgerResult<Self> {
        Ok(Self {
            conn: shared(db::open_in_memory()?)?,
        })
    }
}

impl KeyRegistry for SqliteKeyRegistry {
    fn get(&self, did: &str) -> CryptoResult<Option<AgentKeyRecord>> {
        let conn = db::lock(&self.conn);
        conn.query_row(
            "SELECT did, public_key_hex, persona, registered_at, revoked_at
             FROM agent_keys WHERE did = ?1",
            [did],
            |row| {
                let persona: String = row.get(2)?;
                let revoked_at = match row.get::<_, Option<String>>(4)? {
                    Some(_) => Some(parse_time(row, 4)?),
                    None => None,
                };
                Ok(AgentKeyRecord {
                    did: row.get(0)?,
                    public_key_hex: row.get(1)?,
                    persona: persona.parse().map_err(|e: CryptoError| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?,
                    registered_at: parse_time(row, 3)?,
                    revoked_at,
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    fn put(&self, record: AgentKeyRecord) -> CryptoResult<()> {
        let conn = db::lock(&self.conn);
        conn.execute(
            "INSERT INTO agent_keys (did, public_key_hex, persona, registered_at, revoked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(did) DO UPDATE SET
                public_key_hex = excluded.public_key_hex,
                persona = excluded.persona,
                registered_at = excluded.registered_at,
                revoked_at = COALESCE(agent_keys.revoked_at, excluded.revoked_at)",
            params![
                record.did,
                record.public_key_hex,
                record.persona.as_str(),
                format_timestamp(record.registered_at),
                record.revoked_at.map(format_timestamp),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn revoke(&self, did: &str, at: DateTime<Utc>) -> CryptoResult<bool> {
        let conn = db::lock(&self.conn);
        let changed = conn
            .execute(
                "UPDATE agent_keys SET revoked_at = CASE
                    WHEN revoked_at IS NULL OR revoked_at > ?2 THEN ?2
                    ELSE revoked_at END
                 WHERE did = ?1",
                params![did, format_timestamp(at)],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }
}

#[derive(Clone)]
pub struct SqliteNonceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNonceStore {
    pub fn open(path: &Path) -> LedgerResult<Self> {
        Ok(Self {
            conn: shared(db::open(path)?)?,
        })
    }

    pub fn memory() -> LedgerResult<Self> {
        Ok(Self {
            conn: shared(db::open_in_memory()?)?,
        })
    }
}

impl NonceStore for SqliteNonceStore {
    fn contains(&self, signer_did: &str, nonce: &str) -> CryptoResult<bool> {
        let conn = db::lock(&self.conn);
        conn.query_row(
            "SELECT 1 FROM used_nonces WHERE signer_did = ?1 AND nonce = ?2",
            [signer_did, nonce],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(store_err)
    }

    fn put(&self, signer_did: &str, nonce: &str, signed_at: DateTime<Utc>) -> CryptoResult<bool> {
        let conn = db::lock(&self.conn);
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO used_nonces (signer_did, nonce, signed_at) VALUES (?1, ?2, ?3)",
                params![signer_did, nonce, format_timestamp(signed_at)],
            )
            .map_err(store_err)?;
        Ok(inserted == 1)
    }

    fn evict_before(&self, cutoff: DateTime<Utc>) -> CryptoResult<usize> {
        let conn = db::lock(&self.conn);
        conn.execute(
            "DELETE FROM used_nonces WHERE signed_at < ?1",
            [format_timestamp(cutoff)],
        )
        .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use failsafe_core::crypto::Persona;

    #[test]
    fn test_key_roundtrip_and_revocation_is_sticky() {
        let registry = SqliteKeyRegistry::memory().unwrap();
        let record = AgentKeyRecord::new(Persona::Judge, "abcd");
        let did = record.did.clone();
        assert!(!registry.contains(&did).unwrap());
        registry.put(record.clone()).unwrap();

        let loaded = registry.get(&did).unwrap().unwrap();
        assert_eq!(loaded.persona, Persona::Judge);
        assert_eq!(loaded.public_key_hex, "abcd");
        assert!(!loaded.is_revoked());

        let first = Utc::now();
        assert!(registry.revoke(&did, first).unwrap());
        assert!(registry.revoke(&did, first + Duration::hours(1)).unwrap());
        registry.put(record).unwrap();
        let loaded = registry.get(&did).unwrap().unwrap();
        assert_eq!(loaded.revoked_at.map(format_timestamp), Some(format_timestamp(first)));

        assert!(!registry.revoke("did:myth:judge:00", first).unwrap());
    }

    #[test]
    fn test_nonce_put_once_and_evict() {
        let store = SqliteNonceStore::memory().unwrap();
        let old = Utc::now() - Duration::minutes(10);
        assert!(store.put("did:a", "n1", old).unwrap());
        assert!(!store.put("did:a", "n1", Utc::now()).unwrap());
        assert!(store.put("did:b", "n1", Utc::now()).unwrap());
        assert!(store.contains("did:a", "n1").unwrap());

        let evicted = store.evict_before(Utc::now() - Duration::minutes(5)).unwrap();
        assert_eq!(evicted, 1);
        assert!(!store.contains("did:a", "n1").unwrap());
        assert!(store.contains("did:b", "n1").unwrap());
    }
}
