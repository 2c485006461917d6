//! `failsafe retention` - shadow genome pruning.

use anyhow::Result;
use failsafe_ledger::RetentionPolicy;

use super::context::WorkspaceContext;
use crate::cli::args::RetentionSub;
use crate::exit_codes::SUCCESS;

const DEFAULT_ARCHIVE_NAME: &str = "shadow_genome.json";

pub fn run(ctx: &WorkspaceContext, cmd: RetentionSub) -> Result<i32> {
    let store = ctx.open_shadow()?;
    let mut config = ctx.config.retention.clone();
    if config.archive_path.is_none() {
        config.archive_path = Some(ctx.paths.archive_dir().join(DEFAULT_ARCHIVE_NAME));
    }
    let policy = RetentionPolicy::new(config);

    match cmd {
        RetentionSub::Stats => {
            let stats = policy.retention_stats(&store)?;
            ctx.emit(&stats, |s| {
                println!("total:       {}", s.total_entries);
                println!("resolved:    {}", s.resolved_entries);
                println!("unresolved:  {}", s.unresolved_entries);
                println!("over 90d:    {}", s.entries_over_90_days);
                println!("over 180d:   {}", s.entries_over_180_days);
                println!("prunable:    {}", s.estimated_prune_count);
            })?;
        }
        RetentionSub::Run => {
            let result = policy.execute_retention_maintenance(&store)?;
            ctx.emit(&result, |r| {
                if let Some(path) = &r.archive_path {
                    println!("archived {} entries to {}", r.archived_count, path.display());
                }
                println!(
                    "pruned {} resolved, {} unresolved",
                    r.resolved_pruned, r.unresolved_pruned
                );
            })?;
        }
    }
    Ok(SUCCESS)
}
