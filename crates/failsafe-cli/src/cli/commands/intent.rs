use anyhow::Result;
use failsafe_core::intent::{Intent, IntentStore};

use super::context::WorkspaceContext;
use crate::cli::args::IntentSub;
use crate::exit_codes::{CHECK_FAILED, SUCCESS};

pub fn run(ctx: &WorkspaceContext, cmd: IntentSub) -> Result<i32> {
    let store = IntentStore::new(&ctx.paths, ctx.config.lock.clone());
    match cmd {
        IntentSub::Show { id } => {
            let intent = match &id {
                Some(id) => store.get_archived_intent(id),
                None => store.read_active_intent(),
            };
            let Some(intent) = intent else {
                match id {
                    Some(id) => eprintln!("no archived intent with id {id}"),
                    None => eprintln!("no active intent"),
                }
                return Ok(CHECK_FAILED);
            };
            ctx.emit(&intent, print_intent)?;
            Ok(SUCCESS)
        }
    }
}

fn print_intent(intent: &Intent) {
    println!("id:       {}", intent.id);
    println!("status:   {}", intent.status);
    println!("purpose:  {}", intent.purpose);
    println!("risk:     {}", intent.scope.risk_grade);
    println!("scope:");
    for file in &intent.scope.files {
        println!("  - {file}");
    }
    if let Some(sealed_at) = intent.sealed_at {
        println!("sealed:   {sealed_at}");
    }
}
