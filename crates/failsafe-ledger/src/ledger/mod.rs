//! Hash-chained, HMAC-signed SOA ledger.
//!
//! ```text
//! genesis ◄── e1 ◄── e2 ◄── ... ◄── eN
//! prev = sha256("GENESIS")
//! entry_hash = sha256(json{timestamp, eventType, agentDid, payload, prevHash})
//! signature  = hmac_sha256(secret, entry_hash)
//! ```
//!
//! Appends read the previous hash and insert inside one `BEGIN IMMEDIATE`
//! transaction, so concurrent writers in any process extend a single chain.
//! Rows are never updated or deleted.

mod entry;
mod query;

pub use entry::{
    compute_entry_hash, genesis_prev_hash, sign_entry_hash, verify_entry_signature, LedgerEntry,
    GENESIS_AGENT_DID, GENESIS_MESSAGE,
};
pub use query::{LedgerQuery, MAX_QUERY_ROWS};

use failsafe_core::clock::{format_timestamp, now_timestamp};
use failsafe_core::governance::{LedgerAppendRequest, LedgerEventType, LedgerRecorder};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::db;
use crate::error::LedgerResult;
use crate::schema::SchemaVersionManager;
use crate::secret::LedgerSecret;
use entry::ENTRY_COLUMNS;

/// Result of walking the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerification {
    pub valid: bool,
    pub entries_checked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SoaLedger {
    conn: Arc<Mutex<Connection>>,
    secret: LedgerSecret,
}

impl SoaLedger {
    /// Open a file-backed ledger, migrating the schema and writing the
    /// genesis entry if needed.
    pub fn open(path: &Path, secret: LedgerSecret) -> LedgerResult<Self> {
        Self::from_connection(db::open(path)?, secret)
    }

    pub fn memory(secret: LedgerSecret) -> LedgerResult<Self> {
        Self::from_connection(db::open_in_memory()?, secret)
    }

    pub fn from_connection(conn: Connection, secret: LedgerSecret) -> LedgerResult<Self> {
        let schema = SchemaVersionManager::ledger()?;
        schema.validate_on_init(&conn)?;
        schema.migrate(&conn)?;
        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
            secret,
        };
        ledger.ensure_genesis()?;
        Ok(ledger)
    }

    fn ensure_genesis(&self) -> LedgerResult<()> {
        let conn = db::lock(&self.conn);
        db::immediate(&conn, |conn| -> LedgerResult<()> {
            let count: i64 = conn.query_row("SELECT count(*) FROM soa_ledger", [], |row| row.get(0))?;
            if count > 0 {
                return Ok(());
            }
            let genesis = LedgerAppendRequest::new(
                LedgerEventType::SystemEvent,
                GENESIS_AGENT_DID,
                json!({ "message": GENESIS_MESSAGE }),
            );
            self.insert(conn, &genesis, &genesis_prev_hash())?;
            tracing::info!("ledger genesis entry written");
            Ok(())
        })
    }

    /// Append one entry and return it as stored.
    pub fn append(&self, request: &LedgerAppendRequest) -> LedgerResult<LedgerEntry> {
        let conn = db::lock(&self.conn);
        let entry = db::immediate(&conn, |conn| -> LedgerResult<LedgerEntry> {
            let prev_hash: Option<String> = conn
                .query_row(
                    "SELECT entry_hash FROM soa_ledger ORDER BY id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let prev_hash = prev_hash.unwrap_or_else(genesis_prev_hash);
            self.insert(conn, request, &prev_hash)
        })?;
        tracing::debug!(
            id = entry.id,
            event_type = %entry.event_type,
            agent = %entry.agent_did,
            "ledger entry appended"
        );
        Ok(entry)
    }

    fn insert(
        &self,
        conn: &Connection,
        request: &LedgerAppendRequest,
        prev_hash: &str,
    ) -> LedgerResult<LedgerEntry> {
        let timestamp = now_timestamp();
        let event_type = request.event_type.as_str();
        let entry_hash = compute_entry_hash(
            &timestamp,
            event_type,
            &request.agent_did,
            &request.payload,
            prev_hash,
        )?;
        let signature = sign_entry_hash(&self.secret, &entry_hash)?;
        let risk_grade = request.risk_grade.map(|g| g.to_string());

        conn.execute(
            "INSERT INTO soa_ledger (
                timestamp, event_type, agent_did, agent_trust_at_action,
                model_version, artifact_path, artifact_hash, risk_grade,
                verification_method, verification_result, sentinel_confidence,
                overseer_did, overseer_decision, gdpr_trigger, payload,
                entry_hash, prev_hash, signature
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                timestamp,
                event_type,
                request.agent_did,
                request.agent_trust_at_action,
                request.model_version,
                request.artifact_path,
                request.artifact_hash,
                risk_grade,
                request.verification_method,
                request.verification_result,
                request.sentinel_confidence,
                request.overseer_did,
                request.overseer_decision,
                i64::from(request.gdpr_trigger),
                serde_json::to_string(&request.payload)?,
                entry_hash,
                prev_hash,
                signature,
            ],
        )?;

        Ok(LedgerEntry {
            id: conn.last_insert_rowid(),
            timestamp,
            event_type: request.event_type,
            agent_did: request.agent_did.clone(),
            agent_trust_at_action: request.agent_trust_at_action,
            model_version: request.model_version.clone(),
            artifact_path: request.artifact_path.clone(),
            artifact_hash: request.artifact_hash.clone(),
            risk_grade,
            verification_method: request.verification_method.clone(),
            verification_result: request.verification_result.clone(),
            sentinel_confidence: request.sentinel_confidence,
            overseer_did: request.overseer_did.clone(),
            overseer_decision: request.overseer_decision.clone(),
            gdpr_trigger: request.gdpr_trigger,
            payload: request.payload.clone(),
            entry_hash,
            prev_hash: prev_hash.to_string(),
            signature,
        })
    }

    fn select(
        &self,
        filter: &str,
        values: &[&dyn rusqlite::ToSql],
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM soa_ledger {filter}"))?;
        let rows = stmt.query_map(values, LedgerEntry::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Newest first.
    pub fn recent_entries(&self, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        self.select("ORDER BY id DESC LIMIT ?1", params![limit as i64])
    }

    pub fn entries_by_type(&self, event_type: LedgerEventType, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        self.select(
            "WHERE event_type = ?1 ORDER BY id DESC LIMIT ?2",
            params![event_type.as_str(), limit as i64],
        )
    }

    pub fn entries_by_agent(&self, agent_did: &str, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        self.select(
            "WHERE agent_did = ?1 ORDER BY id DESC LIMIT ?2",
            params![agent_did, limit as i64],
        )
    }

    /// Entries strictly older than `cutoff`, oldest first.
    pub fn entries_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> LedgerResult<Vec<LedgerEntry>> {
        self.select(
            "WHERE timestamp < ?1 ORDER BY id ASC",
            params![format_timestamp(cutoff)],
        )
    }

    pub fn entry_count(&self) -> LedgerResult<u64> {
        let conn = db::lock(&self.conn);
        let count: i64 = conn.query_row("SELECT count(*) FROM soa_ledger", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Filtered search, most recent first, at most [`MAX_QUERY_ROWS`] rows.
    pub fn query(&self, query: &LedgerQuery) -> LedgerResult<Vec<LedgerEntry>> {
        let (sql, values) = query.to_sql();
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), LedgerEntry::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Recompute every hash, link and signature from the raw rows.
    pub fn verify_chain(&self) -> LedgerResult<LedgerVerification> {
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_type, agent_did, payload, entry_hash, prev_hash, signature
             FROM soa_ledger ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                event_type: row.get(2)?,
                agent_did: row.get(3)?,
                payload: row.get(4)?,
                entry_hash: row.get(5)?,
                prev_hash: row.get(6)?,
                signature: row.get(7)?,
            })
        })?;

        let mut checked = 0;
        let mut previous: Option<String> = None;
        for row in rows {
            let row = row?;
            if let Some(reason) = self.check_row(&row, previous.as_deref())? {
                tracing::error!(id = row.id, reason = %reason, "ledger chain broken");
                return Ok(LedgerVerification {
                    valid: false,
                    entries_checked: checked,
                    broken_at: Some(row.id),
                    reason: Some(reason),
                });
            }
            checked += 1;
            previous = Some(row.entry_hash);
        }
        Ok(LedgerVerification {
            valid: true,
            entries_checked: checked,
            broken_at: None,
            reason: None,
        })
    }

    fn check_row(&self, row: &RawRow, previous: Option<&str>) -> LedgerResult<Option<String>> {
        let payload = match row
            .payload
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose() {
            Ok(payload) => payload.unwrap_or(Value::Null),
            Err(_) => return Ok(Some("payload is not valid JSON".into())),
        };
        let expected = compute_entry_hash(
            &row.timestamp,
            &row.event_type,
            &row.agent_did,
            &payload,
            &row.prev_hash,
        )?;
        if expected != row.entry_hash {
            return Ok(Some("entry hash mismatch".into()));
        }
        if !verify_entry_signature(&self.secret, &row.entry_hash, &row.signature)? {
            return Ok(Some("signature mismatch".into()));
        }
        match previous {
            Some(prev) if prev != row.prev_hash => Ok(Some("previous hash mismatch".into())),
            None if row.prev_hash != genesis_prev_hash() => {
                Ok(Some("first entry does not start from genesis".into()))
            }
            _ => Ok(None),
        }
    }
}

struct RawRow {
    id: i64,
    timestamp: String,
    event_type: String,
    agent_did: String,
    payload: Option<String>,
    entry_hash: String,
    prev_hash: String,
    signature: String,
}

impl LedgerRecorder for SoaLedger {
    fn append_entry(&self, request: LedgerAppendRequest) -> anyhow::Result<i64> {
        Ok(self.append(&request)?.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe_core::intent::RiskGrade;

    fn ledger() -> SoaLedger {
        SoaLedger::memory(LedgerSecret::new("test-secret").unwrap()).unwrap()
    }

    fn request(event_type: LedgerEventType, agent: &str) -> LedgerAppendRequest {
        LedgerAppendRequest::new(event_type, agent, json!({"n": 1}))
    }

    #[test]
    fn test_genesis_written_once() {
        let ledger = ledger();
        assert_eq!(ledger.entry_count().unwrap(), 1);
        ledger.ensure_genesis().unwrap();
        assert_eq!(ledger.entry_count().unwrap(), 1);

        let genesis = &ledger.recent_entries(1).unwrap()[0];
        assert_eq!(genesis.event_type, LedgerEventType::SystemEvent);
        assert_eq!(genesis.agent_did, GENESIS_AGENT_DID);
        assert_eq!(genesis.prev_hash, genesis_prev_hash());
        assert_eq!(genesis.payload["message"], GENESIS_MESSAGE);
    }

    #[test]
    fn test_append_links_to_previous() {
        let ledger = ledger();
        let a = ledger.append(&request(LedgerEventType::Proposal, "did:a")).unwrap();
        let b = ledger.append(&request(LedgerEventType::AuditPass, "did:b")).unwrap();
        assert_eq!(b.prev_hash, a.entry_hash);

        let verification = ledger.verify_chain().unwrap();
        assert!(verification.valid);
        assert_eq!(verification.entries_checked, 3);
    }

    #[test]
    fn test_tampered_payload_detected() {
        let ledger = ledger();
        let a = ledger.append(&request(LedgerEventType::Proposal, "did:a")).unwrap();
        ledger.append(&request(LedgerEventType::AuditPass, "did:a")).unwrap();
        {
            let conn = db::lock(&ledger.conn);
            conn.execute(
                "UPDATE soa_ledger SET payload = '{\"n\":2}' WHERE id = ?1",
                [a.id],
            )
            .unwrap();
        }
        let verification = ledger.verify_chain().unwrap();
        assert!(!verification.valid);
        assert_eq!(verification.broken_at, Some(a.id));
        assert_eq!(verification.reason.as_deref(), Some("entry hash mismatch"));
    }

    #[test]
    fn test_wrong_secret_fails_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let ledger = SoaLedger::open(&path, LedgerSecret::new("one").unwrap()).unwrap();
            ledger.append(&request(LedgerEventType::Proposal, "did:a")).unwrap();
        }
        let reopened = SoaLedger::open(&path, LedgerSecret::new("two").unwrap()).unwrap();
        let verification = reopened.verify_chain().unwrap();
        assert_eq!(verification.reason.as_deref(), Some("signature mismatch"));
        assert_eq!(verification.broken_at, Some(1));
    }

    #[test]
    fn test_reads_by_type_agent_and_query() {
        let ledger = ledger();
        ledger.append(&request(LedgerEventType::Proposal, "did:a")).unwrap();
        ledger
            .append(
                &request(LedgerEventType::AuditFail, "did:b")
                    .with_artifact("src/a.rs", None)
                    .with_risk_grade(RiskGrade::L3),
            )
            .unwrap();
        ledger.append(&request(LedgerEventType::AuditFail, "did:a")).unwrap();

        assert_eq!(ledger.entries_by_type(LedgerEventType::AuditFail, 10).unwrap().len(), 2);
        assert_eq!(ledger.entries_by_agent("did:a", 10).unwrap().len(), 2);

        let hits = ledger
            .query(&LedgerQuery {
                risk_grade: Some(RiskGrade::L3),
                artifact_path: Some("src/a.rs".into()),
                ..LedgerQuery::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].agent_did, "did:b");

        let all = ledger.query(&LedgerQuery::default()).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
}
