use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use failsafe_core::crypto::Persona;
use failsafe_core::enforcement::ActionType;
use failsafe_core::governance::LedgerEventType;
use failsafe_core::intent::RiskGrade;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "failsafe",
    version,
    about = "Offline audit tooling for agent governance state: intents, history, ledger and shadow genome"
)]
pub struct Cli {
    /// Workspace root containing `.failsafe/`
    #[arg(long, global = true, env = "FAILSAFE_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an Ed25519 identity for an agent persona
    Keygen(KeygenArgs),
    /// Intent history log
    History(HistoryArgs),
    /// Active or archived Intent
    Intent(IntentArgs),
    /// Decide whether an action on a path would be allowed
    Check(CheckArgs),
    /// Run heuristics and risk routing over a file
    Scan(ScanArgs),
    /// SOA ledger
    Ledger(LedgerArgs),
    /// Schema versions of the ledger and shadow genome databases
    Schema(SchemaArgs),
    /// Shadow genome retention
    Retention(RetentionArgs),
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    #[arg(long, default_value = "scrivener")]
    pub persona: Persona,

    /// Also record the public key in the shared key registry
    #[arg(long)]
    pub register: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub cmd: HistorySub,
}

#[derive(Subcommand, Debug)]
pub enum HistorySub {
    /// Replay the hash chain
    Verify,
    /// Print entries, optionally for one Intent
    List {
        #[arg(long)]
        intent: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct IntentArgs {
    #[command(subcommand)]
    pub cmd: IntentSub,
}

#[derive(Subcommand, Debug)]
pub enum IntentSub {
    /// Show the active Intent, or an archived one by id
    Show {
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ActionArg {
    Write,
    Create,
    Delete,
    Rename,
}

impl From<ActionArg> for ActionType {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Write => ActionType::FileWrite,
            ActionArg::Create => ActionType::FileCreate,
            ActionArg::Delete => ActionType::FileDelete,
            ActionArg::Rename => ActionType::FileRename,
        }
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Workspace-relative target path
    pub path: String,

    #[arg(long, value_enum, default_value = "write")]
    pub action: ActionArg,

    /// Rename destination
    #[arg(long, required_if_eq("action", "rename"))]
    pub to: Option<String>,

    /// Acting agent DID
    #[arg(long, default_value = "did:myth:scrivener:cli")]
    pub agent: String,

    /// Intent the action claims; defaults to the active Intent
    #[arg(long)]
    pub intent: Option<String>,

    /// Route allowed actions through heuristics and record them in the ledger
    #[arg(long)]
    pub record: bool,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Workspace-relative file to analyze
    pub file: String,

    #[arg(long, value_enum, default_value = "write")]
    pub action: ActionArg,
}

#[derive(Args, Debug)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub cmd: LedgerSub,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum GradeArg {
    L1,
    L2,
    L3,
}

impl From<GradeArg> for RiskGrade {
    fn from(arg: GradeArg) -> Self {
        match arg {
            GradeArg::L1 => RiskGrade::L1,
            GradeArg::L2 => RiskGrade::L2,
            GradeArg::L3 => RiskGrade::L3,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum LedgerSub {
    /// Recompute every entry hash, signature and link
    Verify,
    /// Search entries, most recent first
    Query(LedgerQueryArgs),
    /// Export entries older than N days to a compressed archive
    Archive {
        #[arg(long, default_value_t = 90)]
        older_than_days: u32,
    },
}

#[derive(Args, Debug)]
pub struct LedgerQueryArgs {
    #[arg(long)]
    pub agent: Option<String>,
    #[arg(long, value_enum)]
    pub risk_grade: Option<GradeArg>,
    #[arg(long)]
    pub event_type: Option<LedgerEventType>,
    /// RFC 3339 lower bound
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,
    /// RFC 3339 upper bound
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,
    #[arg(long)]
    pub artifact: Option<String>,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DbArg {
    Ledger,
    Shadow,
}

#[derive(Args, Debug)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub cmd: SchemaSub,

    #[arg(long, value_enum, global = true, default_value = "ledger")]
    pub db: DbArg,
}

#[derive(Subcommand, Debug)]
pub enum SchemaSub {
    /// Apply pending migrations
    Migrate,
    /// Current, latest and pending versions
    Status,
    /// Compare recorded checksums with this build
    Verify,
}

#[derive(Args, Debug)]
pub struct RetentionArgs {
    #[command(subcommand)]
    pub cmd: RetentionSub,
}

#[derive(Subcommand, Debug)]
pub enum RetentionSub {
    /// Record counts and prune estimate
    Stats,
    /// Archive then prune expired records
    Run,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ledger_query() {
        let cli = Cli::try_parse_from([
            "failsafe",
            "--json",
            "ledger",
            "query",
            "--agent",
            "did:a",
            "--event-type",
            "audit_fail",
            "--risk-grade",
            "l2",
            "--from",
            "2026-01-01T00:00:00Z",
        ])
        .unwrap();
        assert!(cli.json);
        let Command::Ledger(LedgerArgs {
            cmd: LedgerSub::Query(query),
        }) = cli.cmd
        else {
            panic!("expected ledger query");
        };
        assert_eq!(query.event_type, Some(LedgerEventType::AuditFail));
        assert!(matches!(query.risk_grade, Some(GradeArg::L2)));
        assert!(query.from.is_some());
    }

    #[test]
    fn test_rename_requires_destination() {
        assert!(Cli::try_parse_from(["failsafe", "check", "a.rs", "--action", "rename"]).is_err());
        assert!(
            Cli::try_parse_from(["failsafe", "check", "a.rs", "--action", "rename", "--to", "b.rs"])
                .is_ok()
        );
    }

    #[test]
    fn test_schema_db_flag() {
        let cli = Cli::try_parse_from(["failsafe", "schema", "status", "--db", "shadow"]).unwrap();
        let Command::Schema(args) = cli.cmd else {
            panic!("expected schema");
        };
        assert_eq!(args.db, DbArg::Shadow);
    }
}
