use rusqlite::Connection;

use super::SchemaVersion;
use crate::db;

/// One schema change. Column steps check the live table first, so they can
/// be replayed against databases created before the registry existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    Sql(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl MigrationStep {
    pub(crate) fn apply(&self, conn: &Connection) -> rusqlite::Result<()> {
        match self {
            MigrationStep::Sql(sql) => conn.execute_batch(sql),
            MigrationStep::AddColumn {
                table,
                column,
                definition,
            } => {
                if !db::columns(conn, table)?.contains(*column) {
                    conn.execute_batch(&format!(
                        "ALTER TABLE {table} ADD COLUMN {column} {definition}"
                    ))?;
                }
                Ok(())
            }
            MigrationStep::DropColumn { table, column } => {
                if db::columns(conn, table)?.contains(*column) {
                    conn.execute_batch(&format!("ALTER TABLE {table} DROP COLUMN {column}"))?;
                }
                Ok(())
            }
        }
    }

    /// Stable text form used for checksums.
    pub fn canonical(&self) -> String {
        match self {
            MigrationStep::Sql(sql) => {
                let normalized: Vec<&str> = sql.split_whitespace().collect();
                format!("sql:{}", normalized.join(" "))
            }
            MigrationStep::AddColumn {
                table,
                column,
                definition,
            } => format!("add_column:{table}.{column}:{definition}"),
            MigrationStep::DropColumn { table, column } => format!("drop_column:{table}.{column}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: SchemaVersion,
    pub description: &'static str,
    pub up: Vec<MigrationStep>,
    pub down: Vec<MigrationStep>,
}

impl Migration {
    pub fn checksum(&self) -> String {
        let mut text = format!("{}\n", self.version);
        for step in &self.up {
            text.push_str(&step.canonical());
            text.push('\n');
        }
        text.push_str("--down\n");
        for step in &self.down {
            text.push_str(&step.canonical());
            text.push('\n');
        }
        format!("sha256:{}", failsafe_core::crypto::sha256_hex(text))
    }
}
