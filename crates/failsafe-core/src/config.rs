//! Governance configuration and on-disk layout.
//!
//! Configuration is read from `.failsafe/config/governance.yaml` under the
//! workspace root. Every section is optional; missing keys take defaults.
//! A file that fails to parse is logged and ignored.
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `FAILSAFE_MODE` | `mode` (`observe`, `assist` or `enforce`) |
//! | `FAILSAFE_LOCK_RETRIES` | `lock.retries` |
//! | `FAILSAFE_REPLAY_WINDOW_SECS` | `replay.window_secs` (`0` disables the window) |
//! | `FAILSAFE_LEDGER_PATH` | `ledger.path` |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::crypto::ReplayConfig;
use crate::evaluation::HeuristicsConfig;
use crate::lock::LockConfig;

pub const FAILSAFE_DIR: &str = ".failsafe";
pub const ENV_MODE: &str = "FAILSAFE_MODE";
pub const ENV_LOCK_RETRIES: &str = "FAILSAFE_LOCK_RETRIES";
pub const ENV_REPLAY_WINDOW_SECS: &str = "FAILSAFE_REPLAY_WINDOW_SECS";
pub const ENV_LEDGER_PATH: &str = "FAILSAFE_LEDGER_PATH";

/// How enforcement decisions are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceMode {
    /// Decisions are computed and logged, but every action is allowed.
    Observe,
    /// A missing Intent is opened automatically for the target; violations
    /// are logged as warnings and the action is allowed.
    Assist,
    /// Decisions are returned as evaluated.
    #[default]
    Enforce,
}

impl fmt::Display for GovernanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovernanceMode::Observe => f.write_str("observe"),
            GovernanceMode::Assist => f.write_str("assist"),
            GovernanceMode::Enforce => f.write_str("enforce"),
        }
    }
}

impl FromStr for GovernanceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observe" => Ok(GovernanceMode::Observe),
            "assist" => Ok(GovernanceMode::Assist),
            "enforce" => Ok(GovernanceMode::Enforce),
            other => Err(format!("unknown governance mode: {other}")),
        }
    }
}

/// Retention windows for shadow genome records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub resolved_retention_days: u32,
    pub unresolved_retention_days: u32,
    pub auto_archive_before_prune: bool,
    pub archive_path: Option<PathBuf>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            resolved_retention_days: 90,
            unresolved_retention_days: 180,
            auto_archive_before_prune: true,
            archive_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger database; relative paths resolve against the workspace root.
    pub path: Option<PathBuf>,
    pub shadow_path: Option<PathBuf>,
    /// Environment variable holding the ledger HMAC secret.
    pub secret_env: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            shadow_path: None,
            secret_env: "FAILSAFE_LEDGER_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub mode: GovernanceMode,
    pub lock: LockConfig,
    pub replay: ReplayConfig,
    pub heuristics: HeuristicsConfig,
    pub retention: RetentionConfig,
    pub ledger: LedgerConfig,
}

impl GovernanceConfig {
    /// Load from the workspace config file, then apply environment overrides.
    pub fn load(paths: &FailsafePaths) -> Self {
        let file = paths.config_file();
        let mut config = match Self::from_file(&file) {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %format!("{e:#}"), "ignoring unreadable governance config");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Parse a YAML config file. Returns `Ok(None)` if it does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let config = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(config))
    }

    /// Apply overrides from a key lookup. Invalid values are logged and skipped.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_MODE) {
            match raw.parse() {
                Ok(mode) => self.mode = mode,
                Err(e) => tracing::warn!(var = ENV_MODE, error = %e, "ignoring override"),
            }
        }
        if let Some(raw) = lookup(ENV_LOCK_RETRIES) {
            match raw.trim().parse() {
                Ok(retries) => self.lock.retries = retries,
                Err(e) => tracing::warn!(var = ENV_LOCK_RETRIES, error = %e, "ignoring override"),
            }
        }
        if let Some(raw) = lookup(ENV_REPLAY_WINDOW_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.replay.window_secs = None,
                Ok(secs) => self.replay.window_secs = Some(secs),
                Err(e) => {
                    tracing::warn!(var = ENV_REPLAY_WINDOW_SECS, error = %e, "ignoring override")
                }
            }
        }
        if let Some(raw) = lookup(ENV_LEDGER_PATH) {
            if !raw.trim().is_empty() {
                self.ledger.path = Some(PathBuf::from(raw));
            }
        }
    }
}

/// Resolves the `.failsafe` directory layout under a workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailsafePaths {
    root: PathBuf,
}

impl FailsafePaths {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }

    pub fn base_dir(&self) -> PathBuf {
        self.root.join(FAILSAFE_DIR)
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.base_dir().join("manifest")
    }

    pub fn active_intent_file(&self) -> PathBuf {
        self.manifest_dir().join("active_intent.json")
    }

    pub fn intents_dir(&self) -> PathBuf {
        self.manifest_dir().join("intents")
    }

    pub fn history_file(&self) -> PathBuf {
        self.manifest_dir().join("intent_history.jsonl")
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.base_dir().join("ledger")
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir().join("config").join("governance.yaml")
    }

    pub fn custom_patterns_file(&self) -> PathBuf {
        self.base_dir().join("config").join("custom_patterns.yaml")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.base_dir().join("archive")
    }

    /// Ledger database path, honoring `ledger.path`.
    pub fn ledger_db(&self, config: &LedgerConfig) -> PathBuf {
        self.resolve(config.path.as_deref())
            .unwrap_or_else(|| self.ledger_dir().join("soa_ledger.db"))
    }

    /// Shadow genome database path, honoring `ledger.shadow_path`.
    pub fn shadow_db(&self, config: &LedgerConfig) -> PathBuf {
        self.resolve(config.shadow_path.as_deref())
            .unwrap_or_else(|| self.ledger_dir().join("shadow_genome.db"))
    }

    /// Generated HMAC key used when the secret variable is unset.
    pub fn ledger_key_file(&self) -> PathBuf {
        self.ledger_dir().join("ledger.key")
    }

    /// Shared key registry and nonce store.
    pub fn replay_db(&self) -> PathBuf {
        self.ledger_dir().join("replay.db")
    }

    fn resolve(&self, path: Option<&Path>) -> Option<PathBuf> {
        path.map(|p| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.root.join(p)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn write_config(paths: &FailsafePaths, yaml: &str) {
        let file = paths.config_file();
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, yaml).unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = GovernanceConfig::default();
        assert_eq!(config.mode, GovernanceMode::Enforce);
        assert_eq!(config.lock.retries, 5);
        assert_eq!(config.lock.min_timeout_ms, 100);
        assert_eq!(config.lock.max_timeout_ms, 1000);
        assert_eq!(config.replay.window_secs, Some(300));
        assert_eq!(config.retention.resolved_retention_days, 90);
        assert_eq!(config.retention.unresolved_retention_days, 180);
        assert!(config.retention.auto_archive_before_prune);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let paths = FailsafePaths::new(dir.path());
        write_config(
            &paths,
            "mode: observe\nlock:\n  retries: 9\nretention:\n  resolved_retention_days: 30\n",
        );

        let config = GovernanceConfig::from_file(&paths.config_file())
            .unwrap()
            .unwrap();
        assert_eq!(config.mode, GovernanceMode::Observe);
        assert_eq!(config.lock.retries, 9);
        assert_eq!(config.lock.min_timeout_ms, 100);
        assert_eq!(config.retention.resolved_retention_days, 30);
        assert_eq!(config.retention.unresolved_retention_days, 180);
    }

    #[test]
    #[serial]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let paths = FailsafePaths::new(dir.path());
        write_config(&paths, "mode: [unterminated");

        assert!(GovernanceConfig::from_file(&paths.config_file()).is_err());
        let config = GovernanceConfig::load(&paths);
        assert_eq!(config.lock, LockConfig::default());
    }

    #[test]
    fn test_overrides_applied_and_invalid_values_skipped() {
        let vars: HashMap<&str, &str> = [
            (ENV_MODE, "OBSERVE"),
            (ENV_LOCK_RETRIES, "not-a-number"),
            (ENV_REPLAY_WINDOW_SECS, "0"),
            (ENV_LEDGER_PATH, "/var/lib/failsafe/ledger.db"),
        ]
        .into_iter()
        .collect();

        let mut config = GovernanceConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.mode, GovernanceMode::Observe);
        assert_eq!(config.lock.retries, 5);
        assert_eq!(config.replay.window_secs, None);
        assert_eq!(
            config.ledger.path.as_deref(),
            Some(Path::new("/var/lib/failsafe/ledger.db"))
        );
    }

    #[test]
    fn test_assist_mode_from_yaml_and_env() {
        let dir = tempdir().unwrap();
        let paths = FailsafePaths::new(dir.path());
        write_config(&paths, "mode: assist\n");
        let config = GovernanceConfig::from_file(&paths.config_file())
            .unwrap()
            .unwrap();
        assert_eq!(config.mode, GovernanceMode::Assist);
        assert_eq!(config.mode.to_string(), "assist");

        let mut config = GovernanceConfig::default();
        config.apply_overrides(|key| (key == ENV_MODE).then(|| " Assist ".to_string()));
        assert_eq!(config.mode, GovernanceMode::Assist);
        assert!("advise".parse::<GovernanceMode>().is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        let dir = tempdir().unwrap();
        let paths = FailsafePaths::new(dir.path());
        std::env::set_var(ENV_LOCK_RETRIES, "2");
        let config = GovernanceConfig::load(&paths);
        std::env::remove_var(ENV_LOCK_RETRIES);
        assert_eq!(config.lock.retries, 2);
    }

    #[test]
    fn test_layout_paths() {
        let paths = FailsafePaths::new("/work");
        assert_eq!(
            paths.active_intent_file(),
            PathBuf::from("/work/.failsafe/manifest/active_intent.json")
        );
        assert_eq!(
            paths.history_file(),
            PathBuf::from("/work/.failsafe/manifest/intent_history.jsonl")
        );
        let ledger = LedgerConfig {
            path: Some(PathBuf::from("state/ledger.db")),
            ..LedgerConfig::default()
        };
        assert_eq!(paths.ledger_db(&ledger), PathBuf::from("/work/state/ledger.db"));
        assert_eq!(
            paths.shadow_db(&ledger),
            PathBuf::from("/work/.failsafe/ledger/shadow_genome.db")
        );
    }
}
