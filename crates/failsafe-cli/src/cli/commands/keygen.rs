//! `failsafe keygen` - create an agent identity.

use anyhow::{Context, Result};
use failsafe_core::crypto::{generate_key_pair, AgentKeyRecord, KeyRegistry};
use failsafe_ledger::SqliteKeyRegistry;
use serde_json::json;

use super::context::WorkspaceContext;
use crate::cli::args::KeygenArgs;
use crate::exit_codes::SUCCESS;

pub fn run(ctx: &WorkspaceContext, args: KeygenArgs) -> Result<i32> {
    let keys = generate_key_pair().context("failed to generate key pair")?;
    let record = AgentKeyRecord::new(args.persona, keys.public_key_hex.clone());

    if args.register {
        let path = ctx.paths.replay_db();
        let registry = SqliteKeyRegistry::open(&path)
            .with_context(|| format!("failed to open key registry: {}", path.display()))?;
        registry.put(record.clone())?;
        tracing::info!(did = %record.did, path = %path.display(), "agent key registered");
    }

    let out = json!({
        "did": record.did,
        "persona": record.persona,
        "publicKeyHex": keys.public_key_hex,
        "privateKeyHex": keys.private_key_hex,
        "registered": args.register,
    });
    ctx.emit(&out, |out| {
        println!("did:         {}", out["did"].as_str().unwrap_or_default());
        println!("public key:  {}", out["publicKeyHex"].as_str().unwrap_or_default());
        println!("private key: {}", out["privateKeyHex"].as_str().unwrap_or_default());
        println!();
        println!("Store the private key securely; it is not saved anywhere.");
    })?;
    Ok(SUCCESS)
}
