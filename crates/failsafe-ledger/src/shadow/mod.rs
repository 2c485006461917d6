//! Shadow genome: forensic archive of failed verifications.
//!
//! Every failure is classified into a [`FailureMode`] and stored with
//! AVOID/REQUIRE guidance that later runs can feed back to the same agent.
//! Records move through [`RemediationStatus`]; only the resolved class
//! (`RESOLVED`, `WONT_FIX`, `SUPERSEDED`) stamps `resolved_at`.

mod classify;
mod types;

pub use classify::{classify_failure_mode, negative_constraint};
pub use types::{
    ArchiveFailureRequest, FailureMode, FailurePattern, RemediationStatus, ShadowGenomeEntry,
};

use failsafe_core::clock::now_timestamp;
use failsafe_core::crypto::{sha256_hex, CryptoService, KeyRegistry, NonceStore, Persona, SignedEnvelope};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::db;
use crate::error::{LedgerError, LedgerResult};
use crate::schema::SchemaVersionManager;
use types::SHADOW_COLUMNS;

/// Length of the stored DID digest.
const DID_HASH_LEN: usize = 32;

/// Upper bound on constraints returned per agent.
pub const MAX_NEGATIVE_CONSTRAINTS: usize = 10;

const RECENT_CAUSES: usize = 3;

/// Check the `did:myth:{persona}:{lowercase hex}` shape.
pub fn validate_agent_did(did: &str) -> LedgerResult<()> {
    let invalid = || LedgerError::InvalidRecord(format!("invalid agent DID: {did}"));
    let rest = did.strip_prefix("did:myth:").ok_or_else(invalid)?;
    let (persona, hash) = rest.split_once(':').ok_or_else(invalid)?;
    persona.parse::<Persona>().map_err(|_| invalid())?;
    let is_hex = |c: char| c.is_ascii_digit() || ('a'..='f').contains(&c);
    if hash.is_empty() || !hash.chars().all(is_hex) {
        return Err(invalid());
    }
    Ok(())
}

fn did_hash(did: &str) -> String {
    sha256_hex(did)[..DID_HASH_LEN].to_string()
}

#[derive(Clone, Debug)]
pub struct ShadowGenomeStore {
    conn: Arc<Mutex<Connection>>,
}

impl ShadowGenomeStore {
    pub fn open(path: &Path) -> LedgerResult<Self> {
        Self::from_connection(db::open(path)?)
    }

    pub fn memory() -> LedgerResult<Self> {
        Self::from_connection(db::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> LedgerResult<Self> {
        let schema = SchemaVersionManager::shadow_genome()?;
        schema.validate_on_init(&conn)?;
        schema.migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn connection(&self) -> &Mutex<Connection> {
        &self.conn
    }

    /// Classify and store a failure. Returns the new record id.
    pub fn archive_failure(&self, request: &ArchiveFailureRequest) -> LedgerResult<i64> {
        self.insert(request, None)
    }

    /// Like [`archive_failure`](Self::archive_failure), but also stores the
    /// envelope signature when it verifies and was signed by the failing agent.
    /// A rejected envelope still archives the failure, unsigned.
    pub fn archive_signed_failure<T, K, N>(
        &self,
        request: &ArchiveFailureRequest,
        envelope: &SignedEnvelope<T>,
        crypto: &CryptoService<K, N>,
    ) -> LedgerResult<i64>
    where
        T: Serialize,
        K: KeyRegistry,
        N: NonceStore,
    {
        let result = crypto.verify(envelope)?;
        let signed = result.valid && envelope.signer_did == request.agent_did;
        if !signed {
            tracing::warn!(
                agent = %request.agent_did,
                signer = %envelope.signer_did,
                error = ?result.error,
                "failure envelope rejected; archiving unsigned"
            );
        }
        self.insert(
            request,
            signed.then(|| (envelope.signature.as_str(), envelope.signed_at.as_str())),
        )
    }

    fn insert(
        &self,
        request: &ArchiveFailureRequest,
        signature: Option<(&str, &str)>,
    ) -> LedgerResult<i64> {
        validate_agent_did(&request.agent_did)?;
        let mode = classify_failure_mode(request);
        let constraint = negative_constraint(mode, &request.summary);
        let (signature, signature_timestamp) = signature.unzip();

        let conn = db::lock(&self.conn);
        conn.execute(
            "INSERT INTO shadow_genome (
                created_at, ledger_ref, agent_did, input_vector, decision_rationale,
                environment_context, failure_mode, causal_vector, negative_constraint,
                remediation_status, did_hash, signature, signature_timestamp, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'UNRESOLVED', ?10, ?11, ?12, ?13)",
            params![
                now_timestamp(),
                request.ledger_ref,
                request.agent_did,
                request.input_vector,
                request.decision_rationale,
                request.environment_context,
                mode.as_str(),
                request.causal_vector,
                constraint,
                did_hash(&request.agent_did),
                signature,
                signature_timestamp,
                request.created_by,
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(id, agent = %request.agent_did, failure_mode = %mode, "failure archived");
        Ok(id)
    }

    fn select(&self, filter: &str, values: &[&dyn rusqlite::ToSql]) -> LedgerResult<Vec<ShadowGenomeEntry>> {
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(&format!("SELECT {SHADOW_COLUMNS} FROM shadow_genome {filter}"))?;
        let rows = stmt.query_map(values, ShadowGenomeEntry::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Records created before `cutoff`, oldest first.
    pub(crate) fn select_before(&self, cutoff: &str) -> LedgerResult<Vec<ShadowGenomeEntry>> {
        self.select(
            "WHERE created_at < ?1 ORDER BY created_at ASC, id ASC",
            params![cutoff],
        )
    }

    pub fn entry(&self, id: i64) -> LedgerResult<Option<ShadowGenomeEntry>> {
        let conn = db::lock(&self.conn);
        Ok(conn
            .query_row(
                &format!("SELECT {SHADOW_COLUMNS} FROM shadow_genome WHERE id = ?1"),
                [id],
                ShadowGenomeEntry::from_row,
            )
            .optional()?)
    }

    /// Newest first.
    pub fn entries_by_agent(&self, agent_did: &str, limit: usize) -> LedgerResult<Vec<ShadowGenomeEntry>> {
        self.select(
            "WHERE agent_did = ?1 ORDER BY id DESC LIMIT ?2",
            params![agent_did, limit as i64],
        )
    }

    /// Newest first.
    pub fn entries_by_failure_mode(
        &self,
        mode: FailureMode,
        limit: usize,
    ) -> LedgerResult<Vec<ShadowGenomeEntry>> {
        self.select(
            "WHERE failure_mode = ?1 ORDER BY id DESC LIMIT ?2",
            params![mode.as_str(), limit as i64],
        )
    }

    /// Oldest first, so triage works the backlog in order.
    pub fn unresolved_entries(&self, limit: usize) -> LedgerResult<Vec<ShadowGenomeEntry>> {
        self.select(
            "WHERE remediation_status = 'UNRESOLVED' ORDER BY created_at ASC, id ASC LIMIT ?1",
            params![limit as i64],
        )
    }

    /// Move a record to `status`. Notes left as `None` keep the previous
    /// notes. `resolved_by` is recorded as the updater and, for the resolved
    /// class only, as the resolver. Returns `false` if no record has that id.
    pub fn update_remediation_status(
        &self,
        id: i64,
        status: RemediationStatus,
        notes: Option<&str>,
        resolved_by: Option<&str>,
    ) -> LedgerResult<bool> {
        let now = now_timestamp();
        let (resolved_at, resolver) = if status.is_resolved_class() {
            (Some(now.as_str()), resolved_by)
        } else {
            (None, None)
        };
        let conn = db::lock(&self.conn);
        let changed = conn.execute(
            "UPDATE shadow_genome SET
                remediation_status = ?1,
                remediation_notes = COALESCE(?2, remediation_notes),
                resolved_at = ?3,
                resolved_by = ?4,
                updated_at = ?5,
                updated_by = ?6
             WHERE id = ?7",
            params![status.as_str(), notes, resolved_at, resolver, now, resolved_by, id],
        )?;
        if changed > 0 {
            tracing::info!(id, status = %status, "remediation status updated");
        }
        Ok(changed > 0)
    }

    /// Unresolved records grouped by failure mode, most frequent first.
    pub fn analyze_failure_patterns(&self) -> LedgerResult<Vec<FailurePattern>> {
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT failure_mode, count(*) AS n,
                    GROUP_CONCAT(DISTINCT agent_did),
                    GROUP_CONCAT(causal_vector, char(31))
             FROM shadow_genome
             WHERE remediation_status = 'UNRESOLVED'
             GROUP BY failure_mode
             ORDER BY n DESC, failure_mode ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut patterns = Vec::new();
        for row in rows {
            let (mode, count, agents, causes) = row?;
            let failure_mode = mode.parse().map_err(LedgerError::InvalidRecord)?;
            patterns.push(FailurePattern {
                failure_mode,
                count: u64::try_from(count).unwrap_or_default(),
                agent_dids: agents
                    .map(|a| a.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
                recent_causes: causes
                    .map(|c| {
                        c.split('\u{1f}')
                            .filter(|s| !s.is_empty())
                            .take(RECENT_CAUSES)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            });
        }
        Ok(patterns)
    }

    /// Distinct constraints from the agent's unresolved failures, newest first.
    pub fn negative_constraints_for_agent(&self, agent_did: &str) -> LedgerResult<Vec<String>> {
        let conn = db::lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT negative_constraint FROM shadow_genome
             WHERE agent_did = ?1
               AND remediation_status = 'UNRESOLVED'
               AND negative_constraint IS NOT NULL
             GROUP BY negative_constraint
             ORDER BY max(id) DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![agent_did, MAX_NEGATIVE_CONSTRAINTS as i64],
            |row| row.get::<_, String>(0),
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn entry_count(&self) -> LedgerResult<u64> {
        let conn = db::lock(&self.conn);
        let count: i64 = conn.query_row("SELECT count(*) FROM shadow_genome", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
