//! Intent model, durable state and lifecycle history.
//!
//! ```text
//!   create ──► PULSE ──► PASS ──► SEALED ──► archived
//!                │
//!                └─────► VETO
//! ```
//!
//! Exactly one Intent is active at a time. State lives in
//! `.failsafe/manifest/active_intent.json`; every transition is appended to
//! the hash-chained `intent_history.jsonl`.

mod history;
mod service;
mod store;
mod types;

pub use history::{
    ChainVerification, HistoryError, HistoryResult, IntentHistoryEntry, IntentHistoryLog,
    NewHistoryEntry, GENESIS_HASH,
};
pub use service::{CreateIntentRequest, EvidenceUpdate, IntentService, IntentServiceError};
pub use store::{ActiveIntentGuard, IntentStore, IntentStoreError, IntentStoreResult};
pub use types::{
    HistoryEvent, Intent, IntentEvidence, IntentMetadata, IntentScope, IntentStatus, IntentType,
    RiskGrade, MAX_PURPOSE_LEN,
};

/// Source of the currently active Intent.
pub trait IntentProvider {
    fn active_intent(&self) -> Option<Intent>;

    /// Open an Intent covering `target` when none is active.
    ///
    /// Read-only providers refuse with [`IntentServiceError::ReadOnly`].
    fn open_session_intent(&self, target: &str) -> Result<Intent, IntentServiceError> {
        let _ = target;
        Err(IntentServiceError::ReadOnly)
    }
}

impl IntentProvider for IntentStore {
    fn active_intent(&self) -> Option<Intent> {
        self.read_active_intent()
    }
}

/// A fixed snapshot, e.g. an Intent already loaded by the caller.
impl IntentProvider for Option<Intent> {
    fn active_intent(&self) -> Option<Intent> {
        self.clone()
    }
}

impl<P: IntentProvider + ?Sized> IntentProvider for &P {
    fn active_intent(&self) -> Option<Intent> {
        (**self).active_intent()
    }

    fn open_session_intent(&self, target: &str) -> Result<Intent, IntentServiceError> {
        (**self).open_session_intent(target)
    }
}
