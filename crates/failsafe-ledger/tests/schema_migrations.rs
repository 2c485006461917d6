use failsafe_ledger::db;
use failsafe_ledger::schema::{SchemaVersion, SchemaVersionManager};
use failsafe_ledger::{LedgerError, LedgerSecret, ShadowGenomeStore, SoaLedger};

#[test]
fn migrate_twice_applies_then_skips() {
    for manager in [
        SchemaVersionManager::ledger().unwrap(),
        SchemaVersionManager::shadow_genome().unwrap(),
    ] {
        let conn = db::open_in_memory().unwrap();
        let first = manager.migrate(&conn).unwrap();
        assert!(!first.applied.is_empty(), "{}", manager.table());
        assert!(first.skipped.is_empty());

        let second = manager.migrate(&conn).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped, first.applied);

        let status = manager.status(&conn).unwrap();
        assert_eq!(status.current, manager.latest());
        assert!(status.pending.is_empty());
        assert!(status.integrity_valid);
    }
}

#[test]
fn latest_versions() {
    assert_eq!(
        SchemaVersionManager::ledger().unwrap().latest(),
        Some(SchemaVersion::new(2, 0, 0))
    );
    assert_eq!(
        SchemaVersionManager::shadow_genome().unwrap().latest(),
        Some(SchemaVersion::new(1, 2, 0))
    );
}

#[test]
fn drifted_checksum_blocks_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    SoaLedger::open(&path, LedgerSecret::new("s").unwrap()).unwrap();

    let conn = db::open(&path).unwrap();
    conn.execute(
        "UPDATE schema_migrations SET checksum = 'sha256:00' WHERE version = '2.0.0'",
        [],
    )
    .unwrap();
    drop(conn);

    let err = SoaLedger::open(&path, LedgerSecret::new("s").unwrap()).unwrap_err();
    assert!(matches!(err, LedgerError::IntegrityMismatch { .. }), "{err}");
}

#[test]
fn newer_database_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shadow.db");
    ShadowGenomeStore::open(&path).unwrap();

    let conn = db::open(&path).unwrap();
    conn.execute(
        "INSERT INTO schema_version (version, description, applied_at, checksum)
         VALUES ('9.0.0', 'future', '2030-01-01T00:00:00.000Z', 'sha256:ff')",
        [],
    )
    .unwrap();
    drop(conn);

    let err = ShadowGenomeStore::open(&path).unwrap_err();
    assert!(matches!(err, LedgerError::IncompatibleSchema { .. }), "{err}");
}

#[test]
fn shadow_rollback_drops_signature_columns() {
    let manager = SchemaVersionManager::shadow_genome().unwrap();
    let conn = db::open_in_memory().unwrap();
    manager.migrate(&conn).unwrap();

    let rolled = manager.rollback(&conn, SchemaVersion::new(1, 0, 0)).unwrap();
    assert_eq!(
        rolled,
        vec![SchemaVersion::new(1, 2, 0), SchemaVersion::new(1, 1, 0)]
    );
    let has_did_hash: i64 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('shadow_genome') WHERE name = 'did_hash'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(has_did_hash, 0);

    let report = manager.migrate(&conn).unwrap();
    assert_eq!(report.applied.len(), 2);
}
