//! Cold-storage export of old ledger entries.
//!
//! The archive is content-addressed: the file name carries the first twelve
//! hex digits of the SHA-256 of the exported JSON, so re-archiving the same
//! range is idempotent. Ledger rows are never deleted; the export itself is
//! recorded as a `SYSTEM_EVENT` so the chain shows when it happened.

use chrono::{DateTime, Utc};
use failsafe_core::atomic::write_new_atomic;
use failsafe_core::crypto::sha256_hex;
use failsafe_core::governance::{LedgerAppendRequest, LedgerEventType};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::SoaLedger;

pub const ARCHIVE_AGENT_DID: &str = "system:retention-policy";

const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerArchive {
    pub path: PathBuf,
    /// SHA-256 of the uncompressed JSON.
    pub archive_hash: String,
    pub count: usize,
    /// Id of the `SYSTEM_EVENT` recording the export.
    pub ledger_entry_id: i64,
}

pub struct LedgerArchiver<'a> {
    ledger: &'a SoaLedger,
    dir: PathBuf,
}

impl<'a> LedgerArchiver<'a> {
    pub fn new(ledger: &'a SoaLedger, dir: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            dir: dir.into(),
        }
    }

    /// Export entries older than `cutoff`. Returns `None` when there are none.
    pub fn archive_before(&self, cutoff: DateTime<Utc>) -> LedgerResult<Option<LedgerArchive>> {
        let entries = self.ledger.entries_before(cutoff)?;
        if entries.is_empty() {
            return Ok(None);
        }

        let json = serde_json::to_vec(&entries)?;
        let archive_hash = sha256_hex(&json);
        let path = self
            .dir
            .join(format!("ledger-archive-{}.json.gz", &archive_hash[..HASH_PREFIX_LEN]));
        let compressed = gzip(&json).map_err(|e| LedgerError::io(&path, e))?;

        match write_new_atomic(&path, &compressed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "ledger archive already present");
            }
            Err(e) => return Err(LedgerError::io(&path, e)),
        }

        let request = LedgerAppendRequest::new(
            LedgerEventType::SystemEvent,
            ARCHIVE_AGENT_DID,
            json!({
                "action": "LEDGER_ARCHIVED",
                "archiveHash": archive_hash,
                "count": entries.len(),
                "path": path.display().to_string(),
            }),
        );
        let recorded = self.ledger.append(&request)?;
        tracing::info!(count = entries.len(), path = %path.display(), "ledger entries archived");

        Ok(Some(LedgerArchive {
            path,
            archive_hash,
            count: entries.len(),
            ledger_entry_id: recorded.id,
        }))
    }
}

fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Decompress an archive written by [`LedgerArchiver`].
pub fn read_archive(path: &Path) -> LedgerResult<Vec<crate::ledger::LedgerEntry>> {
    use std::io::Read;
    let file = std::fs::File::open(path).map_err(|e| LedgerError::io(path, e))?;
    let mut json = String::new();
    flate2::read::GzDecoder::new(file)
        .read_to_string(&mut json)
        .map_err(|e| LedgerError::io(path, e))?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::LedgerSecret;
    use chrono::Duration;

    #[test]
    fn test_archive_keeps_rows_and_records_event() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SoaLedger::memory(LedgerSecret::new("k").unwrap()).unwrap();
        ledger
            .append(&LedgerAppendRequest::new(
                LedgerEventType::Proposal,
                "did:a",
                json!({}),
            ))
            .unwrap();

        let archiver = LedgerArchiver::new(&ledger, dir.path());
        let cutoff = Utc::now() + Duration::seconds(5);
        let archive = archiver.archive_before(cutoff).unwrap().unwrap();
        assert_eq!(archive.count, 2);
        assert!(archive
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ledger-archive-"));
        assert_eq!(read_archive(&archive.path).unwrap().len(), 2);

        assert_eq!(ledger.entry_count().unwrap(), 3);
        let event = &ledger.recent_entries(1).unwrap()[0];
        assert_eq!(event.agent_did, ARCHIVE_AGENT_DID);
        assert_eq!(event.payload["action"], "LEDGER_ARCHIVED");
        assert_eq!(event.payload["archiveHash"], archive.archive_hash);
        assert!(ledger.verify_chain().unwrap().valid);
    }

    #[test]
    fn test_nothing_to_archive() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SoaLedger::memory(LedgerSecret::new("k").unwrap()).unwrap();
        let archiver = LedgerArchiver::new(&ledger, dir.path());
        let cutoff = Utc::now() - Duration::days(1);
        assert!(archiver.archive_before(cutoff).unwrap().is_none());
        assert_eq!(ledger.entry_count().unwrap(), 1);
    }
}
