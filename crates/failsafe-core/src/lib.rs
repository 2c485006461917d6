//! Governance core: signed agent identity, Intent lifecycle, axiom
//! enforcement and risk triage.
//!
//! All durable state lives under `.failsafe/` in the workspace root and is
//! guarded by advisory file locks, so independent processes can share it.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `FAILSAFE_MODE` | `observe` or `enforce` |
//! | `FAILSAFE_LOCK_RETRIES` | lock acquisition retries |
//! | `FAILSAFE_REPLAY_WINDOW_SECS` | nonce replay window, `0` for unbounded |
//! | `FAILSAFE_LEDGER_PATH` | ledger database location |

pub mod atomic;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod enforcement;
pub mod evaluation;
pub mod governance;
pub mod intent;
pub mod lock;

// Convenience re-exports
pub use config::{FailsafePaths, GovernanceConfig, GovernanceMode};
pub use crypto::{CryptoService, SignedEnvelope, VerificationError, VerificationResult};
pub use enforcement::{EnforcementEngine, ProposedAction, Verdict};
pub use evaluation::{determine_tier, EvaluationRouter, HeuristicEngine, RoutingDecision};
pub use governance::{
    GovernancePipeline, LedgerAppendRequest, LedgerEventType, LedgerRecorder, PipelineOutcome,
};
pub use intent::{Intent, IntentHistoryLog, IntentProvider, IntentService, IntentStore};
pub use lock::{LockConfig, LockError, LockGuard};
