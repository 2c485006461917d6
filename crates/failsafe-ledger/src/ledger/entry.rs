use failsafe_core::governance::LedgerEventType;
use hmac::{Hmac, Mac};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{LedgerError, LedgerResult};
use crate::secret::LedgerSecret;

pub const GENESIS_AGENT_DID: &str = "did:myth:system:genesis";
pub const GENESIS_MESSAGE: &str = "SOA Ledger initialized";

/// `prev_hash` of the genesis entry.
pub fn genesis_prev_hash() -> String {
    failsafe_core::crypto::sha256_hex("GENESIS")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub timestamp: String,
    pub event_type: LedgerEventType,
    pub agent_did: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_trust_at_action: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentinel_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overseer_did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overseer_decision: Option<String>,
    pub gdpr_trigger: bool,
    pub payload: Value,
    pub entry_hash: String,
    pub prev_hash: String,
    pub signature: String,
}

pub(crate) const ENTRY_COLUMNS: &str = "id, timestamp, event_type, agent_did, agent_trust_at_action, \
     model_version, artifact_path, artifact_hash, risk_grade, verification_method, \
     verification_result, sentinel_confidence, overseer_did, overseer_decision, gdpr_trigger, \
     payload, entry_hash, prev_hash, signature";

impl LedgerEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let event_type: String = row.get(2)?;
        let event_type = event_type
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
        let payload: Option<String> = row.get(15)?;
        let payload = match payload {
            Some(text) => serde_json::from_str(&text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e))
            })?,
            None => Value::Null,
        };
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            event_type,
            agent_did: row.get(3)?,
            agent_trust_at_action: row.get(4)?,
            model_version: row.get(5)?,
            artifact_path: row.get(6)?,
            artifact_hash: row.get(7)?,
            risk_grade: row.get(8)?,
            verification_method: row.get(9)?,
            verification_result: row.get(10)?,
            sentinel_confidence: row.get(11)?,
            overseer_did: row.get(12)?,
            overseer_decision: row.get(13)?,
            gdpr_trigger: row.get::<_, i64>(14)? != 0,
            payload,
            entry_hash: row.get(16)?,
            prev_hash: row.get(17)?,
            signature: row.get(18)?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashInput<'a> {
    timestamp: &'a str,
    event_type: &'a str,
    agent_did: &'a str,
    payload: &'a Value,
    prev_hash: &'a str,
}

/// SHA-256 over the JSON of the chained fields.
pub fn compute_entry_hash(
    timestamp: &str,
    event_type: &str,
    agent_did: &str,
    payload: &Value,
    prev_hash: &str,
) -> LedgerResult<String> {
    let bytes = serde_json::to_vec(&HashInput {
        timestamp,
        event_type,
        agent_did,
        payload,
        prev_hash,
    })?;
    Ok(failsafe_core::crypto::sha256_hex(bytes))
}

fn mac(secret: &LedgerSecret, entry_hash: &str) -> LedgerResult<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| LedgerError::Secret(e.to_string()))?;
    mac.update(entry_hash.as_bytes());
    Ok(mac)
}

/// HMAC-SHA256 of the entry hash, hex encoded.
pub fn sign_entry_hash(secret: &LedgerSecret, entry_hash: &str) -> LedgerResult<String> {
    Ok(hex::encode(mac(secret, entry_hash)?.finalize().into_bytes()))
}

pub fn verify_entry_signature(
    secret: &LedgerSecret,
    entry_hash: &str,
    signature_hex: &str,
) -> LedgerResult<bool> {
    let Ok(signature) = hex::decode(signature_hex) else {
        return Ok(false);
    };
    Ok(mac(secret, entry_hash)?.verify_slice(&signature).is_ok())
}
