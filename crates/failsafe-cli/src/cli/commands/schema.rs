//! `failsafe schema` - migrate and inspect database schema versions.

use anyhow::{Context, Result};
use failsafe_ledger::db;
use failsafe_ledger::{SchemaVersion, SchemaVersionManager};

use super::context::WorkspaceContext;
use crate::cli::args::{DbArg, SchemaSub};
use crate::exit_codes::{CHECK_FAILED, SUCCESS};

pub fn run(ctx: &WorkspaceContext, cmd: SchemaSub, target: DbArg) -> Result<i32> {
    let (path, manager) = match target {
        DbArg::Ledger => (
            ctx.paths.ledger_db(&ctx.config.ledger),
            SchemaVersionManager::ledger()?,
        ),
        DbArg::Shadow => (
            ctx.paths.shadow_db(&ctx.config.ledger),
            SchemaVersionManager::shadow_genome()?,
        ),
    };
    let conn = db::open(&path).with_context(|| format!("failed to open {}", path.display()))?;

    match cmd {
        SchemaSub::Migrate => {
            manager.validate_on_init(&conn)?;
            let report = manager.migrate(&conn)?;
            ctx.emit(&report, |r| {
                if r.applied.is_empty() {
                    println!("{}: up to date", path.display());
                }
                for v in &r.applied {
                    println!("applied {v}");
                }
            })?;
            Ok(SUCCESS)
        }
        SchemaSub::Status => {
            let status = manager.status(&conn)?;
            ctx.emit(&status, |s| {
                println!("current: {}", version_text(s.current));
                println!("latest:  {}", version_text(s.latest));
                for v in &s.pending {
                    println!("pending: {v}");
                }
                println!("integrity: {}", if s.integrity_valid { "ok" } else { "DRIFTED" });
            })?;
            Ok(if status.integrity_valid { SUCCESS } else { CHECK_FAILED })
        }
        SchemaSub::Verify => {
            let report = manager.verify_integrity(&conn)?;
            ctx.emit(&report, |r| {
                for m in &r.mismatches {
                    println!("{}: expected {}, recorded {}", m.version, m.expected, m.actual);
                }
                for v in &r.unknown {
                    println!("{v}: not known to this build");
                }
                if r.valid {
                    println!("all recorded migrations match");
                }
            })?;
            Ok(if report.valid { SUCCESS } else { CHECK_FAILED })
        }
    }
}

fn version_text(version: Option<SchemaVersion>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}
