//! Hash-chained, append-only record of Intent lifecycle events.
//!
//! One JSON object per line. Each entry commits to its predecessor:
//!
//! ```text
//! entry[0].previousHash = GENESIS_HASH
//! entry[n].previousHash = entry[n-1].entryHash
//! entry[n].entryHash    = sha256(json{intentId, timestamp, event,
//!                                     previousStatus?, newStatus?, actor,
//!                                     details?, previousHash})
//! ```
//!
//! The field order of the hash input is fixed; changing it invalidates every
//! existing log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{HistoryEvent, IntentStatus};
use crate::clock;
use crate::config::FailsafePaths;
use crate::crypto::sha256_hex;
use crate::lock::{self, LockConfig, LockError};

/// Previous hash of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed history entry at index {index}: {message}")]
    Malformed { index: usize, message: String },

    #[error("history log ends with an incomplete entry; refusing to append")]
    TornTail,

    #[error("failed to serialize history entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// A lifecycle event to append. Timestamp and hashes are assigned by the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub intent_id: String,
    pub event: HistoryEvent,
    pub previous_status: Option<IntentStatus>,
    pub new_status: Option<IntentStatus>,
    pub actor: String,
    pub details: Option<Value>,
}

impl NewHistoryEntry {
    pub fn new(intent_id: impl Into<String>, event: HistoryEvent, actor: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.into(),
            event,
            previous_status: None,
            new_status: None,
            actor: actor.into(),
            details: None,
        }
    }

    pub fn transition(mut self, from: Option<IntentStatus>, to: Option<IntentStatus>) -> Self {
        self.previous_status = from;
        self.new_status = to;
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IntentHistoryEntry {
    pub intent_id: String,
    /// Recorded text; hashed verbatim.
    pub timestamp: String,
    pub event: HistoryEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<IntentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<IntentStatus>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub previous_hash: String,
    pub entry_hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashInput<'a> {
    intent_id: &'a str,
    timestamp: &'a str,
    event: HistoryEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_status: Option<&'a IntentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_status: Option<&'a IntentStatus>,
    actor: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
    previous_hash: &'a str,
}

impl IntentHistoryEntry {
    /// Recompute the digest over every field except `entry_hash`.
    pub fn compute_hash(&self) -> HistoryResult<String> {
        let input = HashInput {
            intent_id: &self.intent_id,
            timestamp: &self.timestamp,
            event: self.event,
            previous_status: self.previous_status.as_ref(),
            new_status: self.new_status.as_ref(),
            actor: &self.actor,
            details: self.details.as_ref(),
            previous_hash: &self.previous_hash,
        };
        Ok(sha256_hex(serde_json::to_vec(&input)?))
    }
}

/// Outcome of a full chain replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    /// Number of entries checked before stopping.
    pub entries_checked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChainVerification {
    fn intact(entries_checked: usize) -> Self {
        Self {
            valid: true,
            entries_checked,
            broken_at: None,
            error: None,
        }
    }

    fn broken(index: usize, error: String) -> Self {
        Self {
            valid: false,
            entries_checked: index,
            broken_at: Some(index),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntentHistoryLog {
    path: PathBuf,
    lock: LockConfig,
}

impl IntentHistoryLog {
    pub fn new(paths: &FailsafePaths, lock: LockConfig) -> Self {
        Self::at(paths.history_file(), lock)
    }

    /// Log stored at an explicit path.
    pub fn at(path: impl Into<PathBuf>, lock: LockConfig) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry chained to the current tail.
    ///
    /// The lock is held from reading the tail hash until the line is synced,
    /// so concurrent appenders cannot fork the chain.
    pub fn append_entry(&self, new: NewHistoryEntry) -> HistoryResult<IntentHistoryEntry> {
        let _guard = lock::acquire(&self.path, &self.lock)?;

        let text = self.read_text()?;
        let (_, tail) = split_complete(&text);
        if !tail.trim().is_empty() {
            tracing::error!(path = %self.path.display(), "history log has a torn tail");
            return Err(HistoryError::TornTail);
        }
        let previous_hash = last_hash(&text)?;

        let mut entry = IntentHistoryEntry {
            intent_id: new.intent_id,
            timestamp: clock::now_timestamp(),
            event: new.event,
            previous_status: new.previous_status,
            new_status: new.new_status,
            actor: new.actor,
            details: new.details,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash()?;

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.append_line(&line)?;

        tracing::debug!(
            intent_id = %entry.intent_id,
            event = ?entry.event,
            entry_hash = %entry.entry_hash,
            "history entry appended"
        );
        Ok(entry)
    }

    /// Hash of the last entry, or [`GENESIS_HASH`] for an empty log.
    pub fn last_entry_hash(&self) -> HistoryResult<String> {
        last_hash(&self.read_text()?)
    }

    /// Every complete entry in append order.
    ///
    /// A trailing line still being written by a concurrent appender is skipped.
    pub fn load_all_entries(&self) -> HistoryResult<Vec<IntentHistoryEntry>> {
        let text = self.read_text()?;
        let (body, _) = split_complete(&text);
        parse_entries(body)
    }

    /// Entries recorded for one intent, in append order.
    pub fn entries_for_intent(&self, intent_id: &str) -> HistoryResult<Vec<IntentHistoryEntry>> {
        Ok(self
            .load_all_entries()?
            .into_iter()
            .filter(|e| e.intent_id == intent_id)
            .collect())
    }

    /// Replay the chain from genesis, stopping at the first discontinuity.
    pub fn verify_chain_integrity(&self) -> HistoryResult<ChainVerification> {
        let text = self.read_text()?;
        let (body, tail) = split_complete(&text);

        let mut expected = GENESIS_HASH.to_string();
        let mut index = 0;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let entry: IntentHistoryEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    return Ok(ChainVerification::broken(
                        index,
                        format!("Malformed entry at index {index}: {e}"),
                    ))
                }
            };
            if entry.previous_hash != expected {
                return Ok(ChainVerification::broken(
                    index,
                    format!("Chain broken at entry {index}"),
                ));
            }
            if entry.compute_hash()? != entry.entry_hash {
                return Ok(ChainVerification::broken(
                    index,
                    format!("Tamper detected at entry {index}"),
                ));
            }
            expected = entry.entry_hash;
            index += 1;
        }

        if !tail.trim().is_empty() {
            return Ok(ChainVerification::broken(
                index,
                format!("Incomplete entry at index {index}"),
            ));
        }
        Ok(ChainVerification::intact(index))
    }

    fn read_text(&self) -> HistoryResult<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(HistoryError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn append_line(&self, line: &[u8]) -> HistoryResult<()> {
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(line).map_err(io_err)?;
        file.sync_data().map_err(io_err)
    }
}

/// Split into newline-terminated lines and an unterminated trailing fragment.
fn split_complete(text: &str) -> (&str, &str) {
    match text.rfind('\n') {
        Some(end) => text.split_at(end + 1),
        None => ("", text),
    }
}

fn parse_entries(body: &str) -> HistoryResult<Vec<IntentHistoryEntry>> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| HistoryError::Malformed {
                index,
                message: e.to_string(),
            })
        })
        .collect()
}

fn last_hash(text: &str) -> HistoryResult<String> {
    let (body, _) = split_complete(text);
    let Some(last) = body.lines().rev().find(|l| !l.trim().is_empty()) else {
        return Ok(GENESIS_HASH.to_string());
    };
    let index = body.lines().filter(|l| !l.trim().is_empty()).count() - 1;
    let entry: IntentHistoryEntry =
        serde_json::from_str(last).map_err(|e| HistoryError::Malformed {
            index,
            message: e.to_string(),
        })?;
    Ok(entry.entry_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn log_in(dir: &Path) -> IntentHistoryLog {
        IntentHistoryLog::at(dir.join("intent_history.jsonl"), LockConfig::default())
    }

    fn seed(log: &IntentHistoryLog, n: usize) {
        for i in 0..n {
            log.append_entry(
                NewHistoryEntry::new(format!("intent-{i}"), HistoryEvent::StatusChanged, "judge")
                    .transition(Some(IntentStatus::Pulse), Some(IntentStatus::Pass))
                    .details(json!({"round": i})),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_empty_log_is_valid_and_genesis() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        assert_eq!(log.last_entry_hash().unwrap(), GENESIS_HASH);
        assert!(log.load_all_entries().unwrap().is_empty());
        let report = log.verify_chain_integrity().unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 0);
    }

    #[test]
    fn test_entries_are_chained() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        seed(&log, 3);

        let entries = log.load_all_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[1].previous_hash, entries[0].entry_hash);
        assert_eq!(entries[2].previous_hash, entries[1].entry_hash);
        assert_eq!(log.last_entry_hash().unwrap(), entries[2].entry_hash);
        assert!(log.verify_chain_integrity().unwrap().valid);
    }

    #[test]
    fn test_hash_input_field_order_is_fixed() {
        let entry = IntentHistoryEntry {
            intent_id: "i-1".into(),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            event: HistoryEvent::Created,
            previous_status: None,
            new_status: Some(IntentStatus::Pulse),
            actor: "scrivener".into(),
            details: None,
            previous_hash: GENESIS_HASH.into(),
            entry_hash: String::new(),
        };
        let expected = sha256_hex(format!(
            r#"{{"intentId":"i-1","timestamp":"2026-01-01T00:00:00.000Z","event":"CREATED","newStatus":"PULSE","actor":"scrivener","previousHash":"{GENESIS_HASH}"}}"#
        ));
        assert_eq!(entry.compute_hash().unwrap(), expected);
    }

    #[test]
    fn test_field_tamper_detected_at_entry() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        seed(&log, 4);

        let text = fs::read_to_string(log.path()).unwrap();
        let tampered = text.replacen("\"actor\":\"judge\"", "\"actor\":\"judgf\"", 1);
        // First occurrence lives in entry 0.
        fs::write(log.path(), tampered).unwrap();

        let report = log.verify_chain_integrity().unwrap();
        assert!(!report.valid);
        assert_eq!(report.broken_at, Some(0));
        assert_eq!(report.error.as_deref(), Some("Tamper detected at entry 0"));
    }

    #[test]
    fn test_every_single_byte_flip_is_detected() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        seed(&log, 3);
        let original = fs::read(log.path()).unwrap();

        // Byte offset where each entry starts.
        let mut starts = vec![0];
        for (i, b) in original.iter().enumerate() {
            if *b == b'\n' && i + 1 < original.len() {
                starts.push(i + 1);
            }
        }

        for pos in 0..original.len() {
            let mut bytes = original.clone();
            bytes[pos] ^= 0x01;
            fs::write(log.path(), &bytes).unwrap();

            let entry_index = starts.iter().rposition(|s| *s <= pos).unwrap();
            let report = match log.verify_chain_integrity() {
                Ok(report) => report,
                // Invalid UTF-8 makes the log unreadable as text: also a failure.
                Err(HistoryError::Io { .. }) => continue,
                Err(e) => panic!("unexpected error at byte {pos}: {e}"),
            };
            assert!(!report.valid, "flip at byte {pos} went undetected");
            assert!(report.broken_at.unwrap() >= entry_index);
        }
    }

    #[test]
    fn test_removed_entry_breaks_chain() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        seed(&log, 3);

        let text = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        fs::write(log.path(), format!("{}\n{}\n", lines[0], lines[2])).unwrap();

        let report = log.verify_chain_integrity().unwrap();
        assert_eq!(report.broken_at, Some(1));
        assert_eq!(report.error.as_deref(), Some("Chain broken at entry 1"));
    }

    #[test]
    fn test_reader_skips_in_flight_tail_but_writer_refuses() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        seed(&log, 2);

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"{\"intentId\":\"partial").unwrap();

        assert_eq!(log.load_all_entries().unwrap().len(), 2);
        let report = log.verify_chain_integrity().unwrap();
        assert_eq!(report.broken_at, Some(2));

        let err = log
            .append_entry(NewHistoryEntry::new("x", HistoryEvent::Created, "scrivener"))
            .unwrap_err();
        assert!(matches!(err, HistoryError::TornTail));
    }

    #[test]
    fn test_entries_for_intent_filters() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        seed(&log, 3);
        let entries = log.entries_for_intent("intent-1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details, Some(json!({"round": 1})));
    }
}
