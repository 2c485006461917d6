//! `failsafe ledger` - verify, search and archive the SOA ledger.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use failsafe_ledger::{LedgerArchiver, LedgerEntry, LedgerQuery};

use super::context::WorkspaceContext;
use crate::cli::args::{LedgerQueryArgs, LedgerSub};
use crate::exit_codes::{CHECK_FAILED, SUCCESS};

pub fn run(ctx: &WorkspaceContext, cmd: LedgerSub) -> Result<i32> {
    let ledger = ctx.open_ledger()?;
    match cmd {
        LedgerSub::Verify => {
            let verification = ledger.verify_chain()?;
            ctx.emit(&verification, |v| {
                if v.valid {
                    println!("ledger chain intact ({} entries)", v.entries_checked);
                } else {
                    println!(
                        "ledger chain BROKEN at entry #{}: {}",
                        v.broken_at.unwrap_or_default(),
                        v.reason.as_deref().unwrap_or("unknown")
                    );
                }
            })?;
            Ok(if verification.valid { SUCCESS } else { CHECK_FAILED })
        }
        LedgerSub::Query(args) => {
            let entries = ledger.query(&to_query(args))?;
            ctx.emit(&entries, |entries| entries.iter().for_each(print_entry))?;
            Ok(SUCCESS)
        }
        LedgerSub::Archive { older_than_days } => {
            let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
            let archive = LedgerArchiver::new(&ledger, ctx.paths.archive_dir())
                .archive_before(cutoff)
                .context("ledger archive failed")?;
            ctx.emit(&archive, |archive| match archive {
                Some(a) => println!("archived {} entries to {}", a.count, a.path.display()),
                None => println!("no entries older than {older_than_days} days"),
            })?;
            Ok(SUCCESS)
        }
    }
}

fn to_query(args: LedgerQueryArgs) -> LedgerQuery {
    LedgerQuery {
        agent_did: args.agent,
        risk_grade: args.risk_grade.map(Into::into),
        event_type: args.event_type,
        from: args.from,
        to: args.to,
        artifact_path: args.artifact,
        limit: args.limit,
    }
}

fn print_entry(e: &LedgerEntry) {
    println!(
        "#{:<5} {}  {:<20} {}{}",
        e.id,
        e.timestamp,
        e.event_type.as_str(),
        e.agent_did,
        e.artifact_path
            .as_deref()
            .map(|p| format!("  {p}"))
            .unwrap_or_default()
    );
}
