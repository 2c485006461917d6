//! `failsafe scan` - heuristics and tier routing for one file.

use anyhow::Result;
use failsafe_core::evaluation::{EvaluationEvent, EvaluationRouter, HeuristicEngine, RoutingDecision};

use super::context::WorkspaceContext;
use crate::cli::args::ScanArgs;
use crate::exit_codes::SUCCESS;

pub fn run(ctx: &WorkspaceContext, args: ScanArgs) -> Result<i32> {
    let engine = HeuristicEngine::from_config(ctx.heuristics());
    let router = EvaluationRouter::new(engine, ctx.paths.workspace_root());
    let decision = router.route(&EvaluationEvent::new(args.action.into(), args.file));
    ctx.emit(&decision, print_decision)?;
    Ok(SUCCESS)
}

fn print_decision(d: &RoutingDecision) {
    println!(
        "{}: tier {} (risk {}, novelty {:?}, confidence {:?}), complexity {}",
        d.target_path, d.tier, d.triage.risk, d.triage.novelty, d.triage.confidence, d.complexity
    );
    for f in &d.findings {
        println!(
            "  [{}] {} {} at {}:{}  {}",
            f.severity, f.pattern_id, f.name, f.location.line, f.location.column, f.location.snippet
        );
    }
    if !d.required_actions.is_empty() {
        println!("required: {:?}", d.required_actions);
    }
}
