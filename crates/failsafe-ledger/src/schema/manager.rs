use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{Migration, SchemaVersion};
use crate::db;
use crate::error::{LedgerError, LedgerResult};

/// A migration row as recorded in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: SchemaVersion,
    pub description: String,
    pub applied_at: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<SchemaVersion>,
    pub skipped: Vec<SchemaVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumMismatch {
    pub version: SchemaVersion,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub mismatches: Vec<ChecksumMismatch>,
    /// Applied versions this build does not know about.
    pub unknown: Vec<SchemaVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaStatus {
    pub current: Option<SchemaVersion>,
    pub latest: Option<SchemaVersion>,
    pub pending: Vec<SchemaVersion>,
    pub integrity_valid: bool,
}

/// Applies a versioned migration registry and records each application
/// with its checksum.
#[derive(Debug, Clone)]
pub struct SchemaVersionManager {
    table: &'static str,
    migrations: Vec<Migration>,
}

impl SchemaVersionManager {
    /// Registry versions must be strictly increasing.
    pub fn new(table: &'static str, migrations: Vec<Migration>) -> LedgerResult<Self> {
        for pair in migrations.windows(2) {
            if pair[1].version <= pair[0].version {
                return Err(LedgerError::InvalidRegistry(format!(
                    "version {} follows {}",
                    pair[1].version, pair[0].version
                )));
            }
        }
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(LedgerError::InvalidRegistry(format!(
                "bad table name: {table}"
            )));
        }
        Ok(Self { table, migrations })
    }

    /// Manager for the SOA ledger database.
    pub fn ledger() -> LedgerResult<Self> {
        Self::new("schema_migrations", super::registry::ledger_migrations())
    }

    /// Manager for the shadow genome database.
    pub fn shadow_genome() -> LedgerResult<Self> {
        Self::new("schema_version", super::registry::shadow_genome_migrations())
    }

    pub fn table(&self) -> &str {
        self.table
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn latest(&self) -> Option<SchemaVersion> {
        self.migrations.last().map(|m| m.version)
    }

    fn ensure_table(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                checksum TEXT NOT NULL
            )",
            self.table
        ))
    }

    /// Applied migrations in ascending version order.
    pub fn applied(&self, conn: &Connection) -> LedgerResult<Vec<AppliedMigration>> {
        self.ensure_table(conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT version, description, applied_at, checksum FROM {}",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut applied = Vec::new();
        for row in rows {
            let (version, description, applied_at, checksum) = row?;
            applied.push(AppliedMigration {
                version: version.parse()?,
                description,
                applied_at,
                checksum,
            });
        }
        applied.sort_by_key(|m| m.version);
        Ok(applied)
    }

    pub fn current_version(&self, conn: &Connection) -> LedgerResult<Option<SchemaVersion>> {
        Ok(self.applied(conn)?.last().map(|m| m.version))
    }

    /// Apply every unrecorded migration in ascending order. Each migration
    /// and its record commit together or not at all.
    pub fn migrate(&self, conn: &Connection) -> LedgerResult<MigrationReport> {
        self.ensure_table(conn)?;
        let mut report = MigrationReport::default();

        for migration in &self.migrations {
            let applied = db::immediate(conn, |conn| -> LedgerResult<bool> {
                let version = migration.version.to_string();
                let existing: Option<String> = conn
                    .query_row(
                        &format!("SELECT version FROM {} WHERE version = ?1", self.table),
                        [&version],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    return Ok(false);
                }
                for step in &migration.up {
                    step.apply(conn)?;
                }
                conn.execute(
                    &format!(
                        "INSERT INTO {} (version, description, applied_at, checksum) VALUES (?1, ?2, ?3, ?4)",
                        self.table
                    ),
                    params![
                        version,
                        migration.description,
                        failsafe_core::clock::now_timestamp(),
                        migration.checksum()
                    ],
                )?;
                Ok(true)
            })?;

            if applied {
                tracing::info!(
                    table = self.table,
                    version = %migration.version,
                    description = migration.description,
                    "migration applied"
                );
                report.applied.push(migration.version);
            } else {
                report.skipped.push(migration.version);
            }
        }
        Ok(report)
    }

    /// Compare stored checksums with the registry.
    pub fn verify_integrity(&self, conn: &Connection) -> LedgerResult<IntegrityReport> {
        let mut report = IntegrityReport::default();
        for applied in self.applied(conn)? {
            match self.migrations.iter().find(|m| m.version == applied.version) {
                Some(migration) => {
                    let expected = migration.checksum();
                    if expected != applied.checksum {
                        tracing::error!(
                            table = self.table,
                            version = %applied.version,
                            expected = %expected,
                            actual = %applied.checksum,
                            "migration checksum mismatch"
                        );
                        report.mismatches.push(ChecksumMismatch {
                            version: applied.version,
                            expected,
                            actual: applied.checksum,
                        });
                    }
                }
                None => report.unknown.push(applied.version),
            }
        }
        report.valid = report.mismatches.is_empty();
        Ok(report)
    }

    /// Refuse to run against a schema this build cannot vouch for.
    pub fn validate_on_init(&self, conn: &Connection) -> LedgerResult<()> {
        let current = self.current_version(conn)?;
        if let (Some(current), Some(latest)) = (current, self.latest()) {
            if current > latest {
                return Err(LedgerError::IncompatibleSchema {
                    found: current.to_string(),
                    latest: latest.to_string(),
                });
            }
        }
        let integrity = self.verify_integrity(conn)?;
        if let Some(mismatch) = integrity.mismatches.into_iter().next() {
            return Err(LedgerError::IntegrityMismatch {
                version: mismatch.version.to_string(),
                expected: mismatch.expected,
                actual: mismatch.actual,
            });
        }
        Ok(())
    }

    /// Undo applied migrations newer than `target`, newest first.
    pub fn rollback(
        &self,
        conn: &Connection,
        target: SchemaVersion,
    ) -> LedgerResult<Vec<SchemaVersion>> {
        let applied = self.applied(conn)?;
        let mut rolled_back = Vec::new();

        for record in applied.iter().rev().filter(|m| m.version > target) {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.version == record.version)
                .ok_or_else(|| {
                    LedgerError::InvalidVersion(format!(
                        "no definition for applied version {}",
                        record.version
                    ))
                })?;

            db::immediate(conn, |conn| -> LedgerResult<()> {
                for step in &migration.down {
                    step.apply(conn)?;
                }
                conn.execute(
                    &format!("DELETE FROM {} WHERE version = ?1", self.table),
                    [record.version.to_string()],
                )?;
                Ok(())
            })?;

            tracing::warn!(table = self.table, version = %record.version, "migration rolled back");
            rolled_back.push(record.version);
        }
        Ok(rolled_back)
    }

    pub fn status(&self, conn: &Connection) -> LedgerResult<SchemaStatus> {
        let applied = self.applied(conn)?;
        let pending = self
            .migrations
            .iter()
            .filter(|m| !applied.iter().any(|a| a.version == m.version))
            .map(|m| m.version)
            .collect();
        Ok(SchemaStatus {
            current: applied.last().map(|m| m.version),
            latest: self.latest(),
            pending,
            integrity_valid: self.verify_integrity(conn)?.valid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MigrationStep;

    fn registry() -> Vec<Migration> {
        vec![
            Migration {
                version: SchemaVersion::new(1, 0, 0),
                description: "base",
                up: vec![MigrationStep::Sql("CREATE TABLE items (id INTEGER PRIMARY KEY)")],
                down: vec![MigrationStep::Sql("DROP TABLE items")],
            },
            Migration {
                version: SchemaVersion::new(1, 1, 0),
                description: "label",
                up: vec![MigrationStep::AddColumn {
                    table: "items",
                    column: "label",
                    definition: "TEXT",
                }],
                down: vec![MigrationStep::DropColumn {
                    table: "items",
                    column: "label",
                }],
            },
        ]
    }

    fn conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_registry_must_increase() {
        let mut migrations = registry();
        migrations.swap(0, 1);
        assert!(SchemaVersionManager::new("schema_version", migrations).is_err());

        let mut duplicated = registry();
        duplicated[1].version = SchemaVersion::new(1, 0, 0);
        assert!(SchemaVersionManager::new("schema_version", duplicated).is_err());
    }

    #[test]
    fn test_migrate_then_skip() {
        let conn = conn();
        let manager = SchemaVersionManager::new("schema_version", registry()).unwrap();

        let first = manager.migrate(&conn).unwrap();
        assert_eq!(first.applied.len(), 2);
        assert!(first.skipped.is_empty());

        let second = manager.migrate(&conn).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped, first.applied);
    }

    #[test]
    fn test_failed_step_leaves_no_record() {
        let conn = conn();
        let migrations = vec![Migration {
            version: SchemaVersion::new(1, 0, 0),
            description: "broken",
            up: vec![
                MigrationStep::Sql("CREATE TABLE half (id INTEGER)"),
                MigrationStep::Sql("THIS IS NOT SQL"),
            ],
            down: vec![],
        }];
        let manager = SchemaVersionManager::new("schema_version", migrations).unwrap();
        assert!(manager.migrate(&conn).is_err());
        assert!(manager.applied(&conn).unwrap().is_empty());
        assert!(!db::columns(&conn, "half").unwrap().contains("id"));
    }

    #[test]
    fn test_checksum_drift_detected() {
        let conn = conn();
        let manager = SchemaVersionManager::new("schema_version", registry()).unwrap();
        manager.migrate(&conn).unwrap();
        conn.execute(
            "UPDATE schema_version SET checksum = 'sha256:00' WHERE version = '1.1.0'",
            [],
        )
        .unwrap();

        let report = manager.verify_integrity(&conn).unwrap();
        assert!(!report.valid);
        assert_eq!(report.mismatches[0].version, SchemaVersion::new(1, 1, 0));
        assert!(matches!(
            manager.validate_on_init(&conn),
            Err(LedgerError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_newer_database_rejected() {
        let conn = conn();
        let manager = SchemaVersionManager::new("schema_version", registry()).unwrap();
        manager.migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_version (version, description, applied_at, checksum) VALUES ('9.0.0', 'future', 'x', 'y')",
            [],
        )
        .unwrap();
        assert!(matches!(
            manager.validate_on_init(&conn),
            Err(LedgerError::IncompatibleSchema { .. })
        ));
    }

    #[test]
    fn test_rollback_and_status() {
        let conn = conn();
        let manager = SchemaVersionManager::new("schema_version", registry()).unwrap();
        manager.migrate(&conn).unwrap();

        let rolled = manager.rollback(&conn, SchemaVersion::new(1, 0, 0)).unwrap();
        assert_eq!(rolled, vec![SchemaVersion::new(1, 1, 0)]);
        assert!(!db::columns(&conn, "items").unwrap().contains("label"));

        let status = manager.status(&conn).unwrap();
        assert_eq!(status.current, Some(SchemaVersion::new(1, 0, 0)));
        assert_eq!(status.latest, Some(SchemaVersion::new(1, 1, 0)));
        assert_eq!(status.pending, vec![SchemaVersion::new(1, 1, 0)]);
        assert!(status.integrity_valid);

        let report = manager.migrate(&conn).unwrap();
        assert_eq!(report.applied, vec![SchemaVersion::new(1, 1, 0)]);
    }
}
