use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use super::{
    HistoryError, HistoryEvent, Intent, IntentEvidence, IntentHistoryLog, IntentMetadata,
    IntentProvider, IntentScope, IntentStatus, IntentStore, IntentStoreError, IntentType,
    NewHistoryEntry, RiskGrade, MAX_PURPOSE_LEN,
};
use crate::config::{FailsafePaths, GovernanceConfig, GovernanceMode};

const SESSION_ACTOR: &str = "failsafe-assist";
const SESSION_PURPOSE_PREFIX: &str = "Auto-created intent for ";

#[derive(Debug, Error)]
pub enum IntentServiceError {
    #[error("intent {id} is still active with status {status}; seal it first")]
    ActiveIntentExists { id: String, status: IntentStatus },

    #[error("no active intent")]
    NoActiveIntent,

    #[error("invalid purpose: {0}")]
    InvalidPurpose(String),

    #[error("intent {id} is sealed and cannot change")]
    Sealed { id: String },

    #[error("PASS requires a verified audit in enforce mode")]
    AuditRequired,

    #[error("intent {id} must be PASS to seal, found {status}")]
    NotPassed { id: String, status: IntentStatus },

    #[error("intent provider is read-only")]
    ReadOnly,

    #[error(transparent)]
    Store(#[from] IntentStoreError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

pub type IntentServiceResult<T> = Result<T, IntentServiceError>;

#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    pub intent_type: IntentType,
    pub purpose: String,
    pub scope: IntentScope,
    pub metadata: IntentMetadata,
    pub blueprint: Option<String>,
}

/// Partial evidence; `None` keeps the recorded value.
#[derive(Debug, Clone, Default)]
pub struct EvidenceUpdate {
    pub tests_passed: Option<bool>,
    pub build_succeeded: Option<bool>,
    pub visual_verified: Option<bool>,
    pub sentinel_passed: Option<bool>,
}

impl EvidenceUpdate {
    fn apply(&self, evidence: &mut IntentEvidence) {
        if let Some(v) = self.tests_passed {
            evidence.tests_passed = v;
        }
        if let Some(v) = self.build_succeeded {
            evidence.build_succeeded = v;
        }
        if let Some(v) = self.visual_verified {
            evidence.visual_verified = v;
        }
        if let Some(v) = self.sentinel_passed {
            evidence.sentinel_passed = v;
        }
    }
}

/// Drives Intent transitions, keeping state and history in step.
///
/// Each operation holds the active-intent lock from the read through the
/// state write. History is appended before state changes, so a failed
/// append leaves the active Intent untouched.
#[derive(Debug, Clone)]
pub struct IntentService {
    store: IntentStore,
    history: IntentHistoryLog,
    mode: GovernanceMode,
}

impl IntentService {
    pub fn new(store: IntentStore, history: IntentHistoryLog, mode: GovernanceMode) -> Self {
        Self {
            store,
            history,
            mode,
        }
    }

    pub fn from_config(paths: &FailsafePaths, config: &GovernanceConfig) -> Self {
        Self::new(
            IntentStore::new(paths, config.lock.clone()),
            IntentHistoryLog::new(paths, config.lock.clone()),
            config.mode,
        )
    }

    pub fn store(&self) -> &IntentStore {
        &self.store
    }

    pub fn history(&self) -> &IntentHistoryLog {
        &self.history
    }

    pub fn create_intent(
        &self,
        request: CreateIntentRequest,
        actor: &str,
    ) -> IntentServiceResult<Intent> {
        let purpose = request.purpose.trim();
        if purpose.is_empty() {
            return Err(IntentServiceError::InvalidPurpose("purpose is empty".into()));
        }
        if purpose.chars().count() > MAX_PURPOSE_LEN {
            return Err(IntentServiceError::InvalidPurpose(format!(
                "purpose exceeds {MAX_PURPOSE_LEN} characters"
            )));
        }

        let guard = self.store.lock_active()?;
        if let Some(active) = guard.current() {
            if active.status != IntentStatus::Sealed {
                return Err(IntentServiceError::ActiveIntentExists {
                    id: active.id,
                    status: active.status,
                });
            }
            match self.store.archive_intent(&active) {
                Ok(()) | Err(IntentStoreError::AlreadyArchived { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut intent = Intent::new(
            request.intent_type,
            purpose,
            request.scope,
            request.metadata,
        );
        intent.blueprint = request.blueprint;
        self.history.append_entry(
            NewHistoryEntry::new(&intent.id, HistoryEvent::Created, actor)
                .transition(None, Some(IntentStatus::Pulse))
                .details(json!({ "purpose": intent.purpose, "scope": intent.scope.files })),
        )?;
        guard.save(&intent)?;

        tracing::info!(intent_id = %intent.id, actor = %actor, "intent created");
        Ok(intent)
    }

    pub fn update_status(
        &self,
        status: IntentStatus,
        actor: &str,
        audit_verified: bool,
    ) -> IntentServiceResult<Intent> {
        let guard = self.store.lock_active()?;
        let mut intent = guard.current().ok_or(IntentServiceError::NoActiveIntent)?;
        if intent.status == IntentStatus::Sealed {
            return Err(IntentServiceError::Sealed { id: intent.id });
        }
        if status == IntentStatus::Pass && self.mode == GovernanceMode::Enforce && !audit_verified {
            return Err(IntentServiceError::AuditRequired);
        }

        let previous = std::mem::replace(&mut intent.status, status.clone());
        intent.updated_at = Utc::now();
        self.history.append_entry(
            NewHistoryEntry::new(&intent.id, HistoryEvent::StatusChanged, actor)
                .transition(Some(previous.clone()), Some(status.clone())),
        )?;
        guard.save(&intent)?;

        tracing::info!(intent_id = %intent.id, from = %previous, to = %status, "intent status changed");
        Ok(intent)
    }

    pub fn update_evidence(
        &self,
        update: &EvidenceUpdate,
        actor: &str,
    ) -> IntentServiceResult<Intent> {
        let guard = self.store.lock_active()?;
        let mut intent = guard.current().ok_or(IntentServiceError::NoActiveIntent)?;
        if intent.status == IntentStatus::Sealed {
            return Err(IntentServiceError::Sealed { id: intent.id });
        }

        let now = Utc::now();
        let mut evidence = intent.evidence.take().unwrap_or_default();
        update.apply(&mut evidence);
        evidence.verified_at = Some(now);
        let details = serde_json::to_value(&evidence).map_err(HistoryError::from)?;
        intent.evidence = Some(evidence);
        intent.updated_at = now;

        self.history.append_entry(
            NewHistoryEntry::new(&intent.id, HistoryEvent::EvidenceUpdated, actor).details(details),
        )?;
        guard.save(&intent)?;
        Ok(intent)
    }

    /// Seal a PASS intent: record the event, archive it, clear the active slot.
    ///
    /// Safe to retry after a partial failure. A Sealed history entry or an
    /// archived copy left by an earlier attempt is reused, not duplicated.
    pub fn seal_intent(&self, actor: &str) -> IntentServiceResult<Intent> {
        let guard = self.store.lock_active()?;
        let intent = guard.current().ok_or(IntentServiceError::NoActiveIntent)?;
        if intent.status != IntentStatus::Pass {
            return Err(IntentServiceError::NotPassed {
                id: intent.id,
                status: intent.status,
            });
        }

        let already_recorded = self
            .history
            .entries_for_intent(&intent.id)?
            .last()
            .is_some_and(|e| e.event == HistoryEvent::Sealed);
        if !already_recorded {
            self.history.append_entry(
                NewHistoryEntry::new(&intent.id, HistoryEvent::Sealed, actor)
                    .transition(Some(IntentStatus::Pass), Some(IntentStatus::Sealed)),
            )?;
        }

        let sealed = match self.sealed_archive(&intent.id) {
            Some(archived) => archived,
            None => {
                let mut sealed = intent;
                let now = Utc::now();
                sealed.status = IntentStatus::Sealed;
                sealed.sealed_at = Some(now);
                sealed.updated_at = now;
                match self.store.archive_intent(&sealed) {
                    Ok(()) => sealed,
                    Err(IntentStoreError::AlreadyArchived { id }) => self
                        .sealed_archive(&id)
                        .ok_or(IntentStoreError::AlreadyArchived { id })?,
                    Err(e) => return Err(e.into()),
                }
            }
        };
        guard.delete()?;

        tracing::info!(intent_id = %sealed.id, actor = %actor, "intent sealed");
        Ok(sealed)
    }

    /// Open an L1 Intent scoped to a single target for an unattended session.
    pub fn create_session_intent(&self, target: &str) -> IntentServiceResult<Intent> {
        let target = if target.trim().is_empty() { "." } else { target };
        let label: String = target
            .chars()
            .take(MAX_PURPOSE_LEN - SESSION_PURPOSE_PREFIX.len())
            .collect();
        let request = CreateIntentRequest {
            intent_type: IntentType::Feature,
            purpose: format!("{SESSION_PURPOSE_PREFIX}{label}"),
            scope: IntentScope {
                files: vec![target.to_string()],
                risk_grade: RiskGrade::L1,
                ..IntentScope::default()
            },
            metadata: IntentMetadata {
                author: SESSION_ACTOR.to_string(),
                tags: vec!["auto-created".into(), "assist-mode".into()],
                ..IntentMetadata::default()
            },
            blueprint: None,
        };
        self.create_intent(request, SESSION_ACTOR)
    }

    fn sealed_archive(&self, id: &str) -> Option<Intent> {
        self.store
            .get_archived_intent(id)
            .filter(|archived| archived.status == IntentStatus::Sealed)
    }
}

impl IntentProvider for IntentService {
    fn active_intent(&self) -> Option<Intent> {
        self.store.read_active_intent()
    }

    fn open_session_intent(&self, target: &str) -> IntentServiceResult<Intent> {
        self.create_session_intent(target)
    }
}
