use super::args::*;

pub mod check;
pub mod context;
pub mod history;
pub mod intent;
pub mod keygen;
pub mod ledger;
pub mod retention;
pub mod scan;
pub mod schema;

use context::WorkspaceContext;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let ctx = WorkspaceContext::load(&cli.root, cli.json);
    match cli.cmd {
        Command::Keygen(args) => keygen::run(&ctx, args),
        Command::History(args) => history::run(&ctx, args.cmd),
        Command::Intent(args) => intent::run(&ctx, args.cmd),
        Command::Check(args) => check::run(&ctx, args),
        Command::Scan(args) => scan::run(&ctx, args),
        Command::Ledger(args) => ledger::run(&ctx, args.cmd),
        Command::Schema(args) => schema::run(&ctx, args.cmd, args.db),
        Command::Retention(args) => retention::run(&ctx, args.cmd),
    }
}
