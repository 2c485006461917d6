//! Age- and status-based pruning of shadow genome records.
//!
//! Resolved-class records (`RESOLVED`, `WONT_FIX`, `SUPERSEDED`) and
//! `UNRESOLVED` records expire on independent windows. `IN_PROGRESS`
//! records are never pruned.

use chrono::{DateTime, Duration, Utc};
use failsafe_core::atomic::write_new_atomic;
use failsafe_core::clock::{format_timestamp, now_timestamp};
use failsafe_core::config::RetentionConfig;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::db;
use crate::error::{LedgerError, LedgerResult};
use crate::shadow::{ShadowGenomeEntry, ShadowGenomeStore};

const RESOLVED_CLASS_SQL: &str = "remediation_status IN ('RESOLVED', 'WONT_FIX', 'SUPERSEDED')";
const UNRESOLVED_SQL: &str = "remediation_status = 'UNRESOLVED'";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneResult {
    pub resolved_pruned: usize,
    pub unresolved_pruned: usize,
    pub total_pruned: usize,
    pub archived_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionStats {
    pub total_entries: u64,
    pub resolved_entries: u64,
    pub unresolved_entries: u64,
    pub oldest_entry: Option<String>,
    pub newest_entry: Option<String>,
    pub entries_over_90_days: u64,
    pub entries_over_180_days: u64,
    /// Records the configured windows would prune right now.
    pub estimated_prune_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveSnapshot<'a> {
    exported_at: String,
    retention_policy: SnapshotPolicy,
    entry_count: usize,
    oldest_entry: Option<&'a str>,
    newest_entry: Option<&'a str>,
    entries: &'a [ShadowGenomeEntry],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotPolicy {
    older_than_days: u32,
    cutoff_date: String,
}

fn cutoff(now: DateTime<Utc>, days: u32) -> String {
    format_timestamp(now - Duration::days(i64::from(days)))
}

fn count(conn: &Connection, filter: &str, values: &[&dyn rusqlite::ToSql]) -> LedgerResult<u64> {
    let n: i64 = conn.query_row(
        &format!("SELECT count(*) FROM shadow_genome {filter}"),
        values,
        |row| row.get(0),
    )?;
    Ok(u64::try_from(n).unwrap_or_default())
}

/// Insert the timestamp before the extension: `a/b.json` becomes
/// `a/b_2026-01-01T00-00-00-000Z.json`.
pub fn timestamped_archive_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let stamp = format_timestamp(now).replace([':', '.'], "-");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    };
    path.with_file_name(name)
}

#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    config: RetentionConfig,
}

impl RetentionPolicy {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Delete records strictly older than their class window.
    pub fn prune_old_entries(&self, store: &ShadowGenomeStore) -> LedgerResult<PruneResult> {
        self.prune_at(store, Utc::now())
    }

    pub fn prune_at(&self, store: &ShadowGenomeStore, now: DateTime<Utc>) -> LedgerResult<PruneResult> {
        let resolved_cutoff = cutoff(now, self.config.resolved_retention_days);
        let unresolved_cutoff = cutoff(now, self.config.unresolved_retention_days);

        let conn = db::lock(store.connection());
        let (resolved, unresolved) = db::immediate(&conn, |conn| -> LedgerResult<(usize, usize)> {
            let resolved = conn.execute(
                &format!("DELETE FROM shadow_genome WHERE {RESOLVED_CLASS_SQL} AND created_at < ?1"),
                [&resolved_cutoff],
            )?;
            let unresolved = conn.execute(
                &format!("DELETE FROM shadow_genome WHERE {UNRESOLVED_SQL} AND created_at < ?1"),
                [&unresolved_cutoff],
            )?;
            Ok((resolved, unresolved))
        })?;

        tracing::info!(
            resolved_pruned = resolved,
            unresolved_pruned = unresolved,
            "shadow genome pruned"
        );
        Ok(PruneResult {
            resolved_pruned: resolved,
            unresolved_pruned: unresolved,
            total_pruned: resolved + unresolved,
            ..PruneResult::default()
        })
    }

    /// Export every record older than `older_than_days`, oldest first, to a
    /// new JSON file at `path`. Returns the number exported; with nothing to
    /// export no file is written.
    pub fn archive_entries(
        &self,
        store: &ShadowGenomeStore,
        path: &Path,
        older_than_days: u32,
    ) -> LedgerResult<usize> {
        self.archive_at(store, path, older_than_days, Utc::now())
    }

    fn archive_at(
        &self,
        store: &ShadowGenomeStore,
        path: &Path,
        older_than_days: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<usize> {
        let cutoff_date = cutoff(now, older_than_days);
        let entries = store.select_before(&cutoff_date)?;
        if entries.is_empty() {
            tracing::info!(older_than_days, "no shadow genome entries to archive");
            return Ok(0);
        }

        let snapshot = ArchiveSnapshot {
            exported_at: now_timestamp(),
            retention_policy: SnapshotPolicy {
                older_than_days,
                cutoff_date,
            },
            entry_count: entries.len(),
            oldest_entry: entries.first().map(|e| e.created_at.as_str()),
            newest_entry: entries.last().map(|e| e.created_at.as_str()),
            entries: &entries,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        write_new_atomic(path, &bytes).map_err(|e| LedgerError::io(path, e))?;
        tracing::info!(count = entries.len(), path = %path.display(), "shadow genome entries archived");
        Ok(entries.len())
    }

    pub fn retention_stats(&self, store: &ShadowGenomeStore) -> LedgerResult<RetentionStats> {
        let now = Utc::now();
        let resolved_cutoff = cutoff(now, self.config.resolved_retention_days);
        let unresolved_cutoff = cutoff(now, self.config.unresolved_retention_days);

        let conn = db::lock(store.connection());
        let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM shadow_genome",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let older = |days: u32| count(&conn, "WHERE created_at < ?1", params![cutoff(now, days)]);
        let prunable_resolved = count(
            &conn,
            &format!("WHERE {RESOLVED_CLASS_SQL} AND created_at < ?1"),
            params![resolved_cutoff],
        )?;
        let prunable_unresolved = count(
            &conn,
            &format!("WHERE {UNRESOLVED_SQL} AND created_at < ?1"),
            params![unresolved_cutoff],
        )?;

        Ok(RetentionStats {
            total_entries: count(&conn, "", params![])?,
            resolved_entries: count(&conn, &format!("WHERE {RESOLVED_CLASS_SQL}"), params![])?,
            unresolved_entries: count(&conn, &format!("WHERE {UNRESOLVED_SQL}"), params![])?,
            oldest_entry: oldest,
            newest_entry: newest,
            entries_over_90_days: older(90)?,
            entries_over_180_days: older(180)?,
            estimated_prune_count: prunable_resolved + prunable_unresolved,
        })
    }

    /// Archive (when configured) then prune.
    pub fn execute_retention_maintenance(&self, store: &ShadowGenomeStore) -> LedgerResult<PruneResult> {
        let now = Utc::now();
        let mut archived = None;
        if self.config.auto_archive_before_prune {
            if let Some(base) = &self.config.archive_path {
                let path = timestamped_archive_path(base, now);
                let count = self.archive_at(store, &path, self.config.resolved_retention_days, now)?;
                archived = Some((count, (count > 0).then_some(path)));
            }
        }

        let mut result = self.prune_at(store, now)?;
        if let Some((count, path)) = archived {
            result.archived_count = count;
            result.archive_path = path;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::{ArchiveFailureRequest, RemediationStatus};

    const AGENT: &str = "did:myth:judge:abc123";

    fn store_with_ages(ages: &[(i64, RemediationStatus)]) -> ShadowGenomeStore {
        let store = ShadowGenomeStore::memory().unwrap();
        let now = Utc::now();
        for (days, status) in ages {
            let id = store
                .archive_failure(&ArchiveFailureRequest {
                    agent_did: AGENT.into(),
                    input_vector: format!("{days} days"),
                    summary: "s".into(),
                    ..ArchiveFailureRequest::default()
                })
                .unwrap();
            store.update_remediation_status(id, *status, None, None).unwrap();
            let created = format_timestamp(now - Duration::days(*days));
            db::lock(store.connection())
                .execute(
                    "UPDATE shadow_genome SET created_at = ?1 WHERE id = ?2",
                    params![created, id],
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_timestamped_archive_path() {
        let at = DateTime::parse_from_rfc3339("2026-03-04T05:06:07.089Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            timestamped_archive_path(Path::new("out/archive.json"), at),
            PathBuf::from("out/archive_2026-03-04T05-06-07-089Z.json")
        );
    }

    #[test]
    fn test_in_progress_never_pruned() {
        let store = store_with_ages(&[(400, RemediationStatus::InProgress)]);
        let result = RetentionPolicy::default().prune_old_entries(&store).unwrap();
        assert_eq!(result.total_pruned, 0);
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_archive_nothing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        let store = store_with_ages(&[(1, RemediationStatus::Resolved)]);
        let n = RetentionPolicy::default()
            .archive_entries(&store, &path, 90)
            .unwrap();
        assert_eq!(n, 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_archive_snapshot_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        let store = store_with_ages(&[
            (200, RemediationStatus::Resolved),
            (100, RemediationStatus::Unresolved),
            (1, RemediationStatus::Unresolved),
        ]);
        let n = RetentionPolicy::default()
            .archive_entries(&store, &path, 90)
            .unwrap();
        assert_eq!(n, 2);

        let snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(snapshot["entryCount"], 2);
        assert_eq!(snapshot["retentionPolicy"]["olderThanDays"], 90);
        assert_eq!(snapshot["entries"][0]["inputVector"], "200 days");
        assert_eq!(snapshot["oldestEntry"], snapshot["entries"][0]["createdAt"]);
        assert_eq!(snapshot["newestEntry"], snapshot["entries"][1]["createdAt"]);
    }

    #[test]
    fn test_stats() {
        let store = store_with_ages(&[
            (200, RemediationStatus::Resolved),
            (100, RemediationStatus::Unresolved),
            (1, RemediationStatus::InProgress),
        ]);
        let stats = RetentionPolicy::default().retention_stats(&store).unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.resolved_entries, 1);
        assert_eq!(stats.unresolved_entries, 1);
        assert_eq!(stats.entries_over_90_days, 2);
        assert_eq!(stats.entries_over_180_days, 1);
        assert_eq!(stats.estimated_prune_count, 1);
        assert!(stats.oldest_entry < stats.newest_entry);
    }

    #[test]
    fn test_maintenance_archives_then_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RetentionPolicy::new(RetentionConfig {
            archive_path: Some(dir.path().join("shadow.json")),
            ..RetentionConfig::default()
        });
        let store = store_with_ages(&[
            (200, RemediationStatus::Unresolved),
            (95, RemediationStatus::Superseded),
            (95, RemediationStatus::Unresolved),
        ]);

        let result = policy.execute_retention_maintenance(&store).unwrap();
        assert_eq!(result.archived_count, 3);
        assert_eq!(result.resolved_pruned, 1);
        assert_eq!(result.unresolved_pruned, 1);
        assert_eq!(result.total_pruned, 2);
        let path = result.archive_path.unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("shadow_"));
        assert_eq!(store.entry_count().unwrap(), 1);
    }
}
