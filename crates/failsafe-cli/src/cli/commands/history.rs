//! `failsafe history` - inspect and verify the Intent history chain.

use anyhow::{Context, Result};
use failsafe_core::intent::IntentHistoryLog;

use super::context::WorkspaceContext;
use crate::cli::args::HistorySub;
use crate::exit_codes::{CHECK_FAILED, SUCCESS};

pub fn run(ctx: &WorkspaceContext, cmd: HistorySub) -> Result<i32> {
    let log = IntentHistoryLog::new(&ctx.paths, ctx.config.lock.clone());
    match cmd {
        HistorySub::Verify => {
            let verification = log
                .verify_chain_integrity()
                .with_context(|| format!("failed to read {}", log.path().display()))?;
            ctx.emit(&verification, |v| {
                if v.valid {
                    println!("history chain intact ({} entries)", v.entries_checked);
                } else {
                    println!(
                        "history chain BROKEN at entry {}: {}",
                        v.broken_at.unwrap_or_default(),
                        v.error.as_deref().unwrap_or("unknown")
                    );
                }
            })?;
            Ok(if verification.valid { SUCCESS } else { CHECK_FAILED })
        }
        HistorySub::List { intent } => {
            let entries = match &intent {
                Some(id) => log.entries_for_intent(id)?,
                None => log.load_all_entries()?,
            };
            ctx.emit(&entries, |entries| {
                for e in entries {
                    let transition = match (&e.previous_status, &e.new_status) {
                        (Some(from), Some(to)) => format!(" {from} -> {to}"),
                        (None, Some(to)) => format!(" -> {to}"),
                        _ => String::new(),
                    };
                    println!("{}  {}  {:?}{}  by {}", e.timestamp, e.intent_id, e.event, transition, e.actor);
                }
            })?;
            Ok(SUCCESS)
        }
    }
}
