//! Paths, configuration and store handles shared by every command.

use anyhow::{Context, Result};
use failsafe_core::evaluation::HeuristicsConfig;
use failsafe_core::{FailsafePaths, GovernanceConfig};
use failsafe_ledger::{LedgerSecret, ShadowGenomeStore, SoaLedger};
use serde::Serialize;
use std::path::Path;

pub struct WorkspaceContext {
    pub paths: FailsafePaths,
    pub config: GovernanceConfig,
    pub json: bool,
}

impl WorkspaceContext {
    pub fn load(root: &Path, json: bool) -> Self {
        let paths = FailsafePaths::new(root);
        let config = GovernanceConfig::load(&paths);
        Self {
            paths,
            config,
            json,
        }
    }

    /// Heuristics settings with the workspace pattern file as fallback.
    pub fn heuristics(&self) -> HeuristicsConfig {
        let mut heuristics = self.config.heuristics.clone();
        if heuristics.custom_patterns.is_none() {
            heuristics.custom_patterns = Some(self.paths.custom_patterns_file());
        }
        heuristics
    }

    pub fn ledger_secret(&self) -> Result<LedgerSecret> {
        LedgerSecret::resolve(&self.config.ledger.secret_env, &self.paths.ledger_key_file())
            .context("failed to load ledger secret")
    }

    pub fn open_ledger(&self) -> Result<SoaLedger> {
        let path = self.paths.ledger_db(&self.config.ledger);
        SoaLedger::open(&path, self.ledger_secret()?)
            .with_context(|| format!("failed to open ledger: {}", path.display()))
    }

    pub fn open_shadow(&self) -> Result<ShadowGenomeStore> {
        let path = self.paths.shadow_db(&self.config.ledger);
        ShadowGenomeStore::open(&path)
            .with_context(|| format!("failed to open shadow genome: {}", path.display()))
    }

    /// Print `value` as pretty JSON when `--json` is set, otherwise run `text`.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}
