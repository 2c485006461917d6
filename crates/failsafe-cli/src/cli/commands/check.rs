//! `failsafe check` - evaluate a proposed action against the active Intent.

use anyhow::{Context, Result};
use failsafe_core::enforcement::{EnforcementEngine, ProposedAction, Verdict};
use failsafe_core::evaluation::{EvaluationRouter, HeuristicEngine};
use failsafe_core::intent::IntentService;
use failsafe_core::GovernancePipeline;

use super::context::WorkspaceContext;
use crate::cli::args::CheckArgs;
use crate::exit_codes::{CHECK_FAILED, SUCCESS};

pub fn run(ctx: &WorkspaceContext, args: CheckArgs) -> Result<i32> {
    let service = IntentService::from_config(&ctx.paths, &ctx.config);
    let mut action = ProposedAction::new(args.action.into(), args.path.clone(), args.agent.clone());
    if let Some(to) = &args.to {
        action = action.renamed_to(to.clone());
    }
    if let Some(id) = &args.intent {
        action = action.for_intent(id.clone());
    }
    let root = ctx.paths.workspace_root();
    let enforcement = EnforcementEngine::new(service, root).with_mode(ctx.config.mode);

    let allowed = if args.record {
        let router = EvaluationRouter::new(HeuristicEngine::from_config(ctx.heuristics()), root);
        let pipeline = GovernancePipeline::new(enforcement, router, ctx.open_ledger()?, args.agent);
        let outcome = pipeline
            .handle_action(&action, None)
            .context("governance pipeline failed")?;
        let allowed = outcome.verdict.is_allowed();
        ctx.emit(&outcome, |o| {
            print_verdict(&o.verdict);
            if let Some(routing) = &o.routing {
                println!("tier {} ({} findings)", routing.tier, routing.findings.len());
            }
            if let Some(id) = o.ledger_entry_id {
                println!("ledger entry #{id}");
            }
        })?;
        allowed
    } else {
        let verdict = enforcement.evaluate_action(&enforcement.bind_to_active(&action));
        ctx.emit(&verdict, print_verdict)?;
        verdict.is_allowed()
    };

    Ok(if allowed { SUCCESS } else { CHECK_FAILED })
}

fn print_verdict(verdict: &Verdict) {
    println!("{}: {}", verdict.status(), verdict.message());
    match verdict {
        Verdict::Block {
            axiom_violated,
            remediation,
            ..
        } => {
            println!("violated {axiom_violated}");
            println!("remediation: {remediation}");
        }
        Verdict::Escalate { escalation_to, .. } => println!("escalated to {escalation_to:?}"),
        Verdict::Allow { .. } => {}
    }
}
