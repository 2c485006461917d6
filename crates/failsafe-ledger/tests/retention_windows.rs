use chrono::{Duration, Utc};
use failsafe_core::clock::format_timestamp;
use failsafe_ledger::db;
use failsafe_ledger::{
    ArchiveFailureRequest, RemediationStatus, RetentionPolicy, ShadowGenomeStore,
};
use std::path::Path;

const AGENT: &str = "did:myth:sentinel:5e5e";

fn seed(path: &Path, status: RemediationStatus, age_days: i64) -> i64 {
    let store = ShadowGenomeStore::open(path).unwrap();
    let id = store
        .archive_failure(&ArchiveFailureRequest {
            agent_did: AGENT.into(),
            input_vector: format!("{status} aged {age_days}"),
            summary: "seed".into(),
            ..ArchiveFailureRequest::default()
        })
        .unwrap();
    store
        .update_remediation_status(id, status, None, Some(AGENT))
        .unwrap();

    let conn = db::open(path).unwrap();
    conn.execute(
        "UPDATE shadow_genome SET created_at = ?1 WHERE id = ?2",
        rusqlite::params![format_timestamp(Utc::now() - Duration::days(age_days)), id],
    )
    .unwrap();
    id
}

#[test]
fn each_class_expires_on_its_own_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shadow.db");

    let mut expected_survivors = Vec::new();
    for status in [RemediationStatus::Resolved, RemediationStatus::Unresolved] {
        for age in [1, 91, 181] {
            let id = seed(&path, status, age);
            let expired = match status {
                RemediationStatus::Unresolved => age >= 180,
                _ => age >= 90,
            };
            if !expired {
                expected_survivors.push(id);
            }
        }
    }

    let store = ShadowGenomeStore::open(&path).unwrap();
    let result = RetentionPolicy::default().prune_old_entries(&store).unwrap();
    assert_eq!(result.resolved_pruned, 2);
    assert_eq!(result.unresolved_pruned, 1);
    assert_eq!(result.total_pruned, 3);

    let mut survivors: Vec<i64> = store
        .entries_by_agent(AGENT, 100)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    survivors.sort_unstable();
    assert_eq!(survivors, expected_survivors);
}

#[test]
fn wont_fix_and_superseded_count_as_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shadow.db");
    seed(&path, RemediationStatus::WontFix, 100);
    seed(&path, RemediationStatus::Superseded, 100);
    seed(&path, RemediationStatus::InProgress, 100);

    let store = ShadowGenomeStore::open(&path).unwrap();
    let result = RetentionPolicy::default().prune_old_entries(&store).unwrap();
    assert_eq!(result.resolved_pruned, 2);
    assert_eq!(store.entry_count().unwrap(), 1);
}
