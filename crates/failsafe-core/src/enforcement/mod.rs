//! Axiom-based authorization of file-modifying actions.
//!
//! ```text
//! ProposedAction
//!      │
//!      ▼
//! ┌──────────────────┐ BLOCK  ┌──────────────────┐ BLOCK/ESCALATE ┌──────────────────┐ BLOCK
//! │ 1 intent binding │──────► │ 3 status gate    │──────────────► │ 2 path & scope   │──────►
//! └──────────────────┘        └──────────────────┘                └──────────────────┘
//!                                                                          │ ALLOW
//!                                                                          ▼
//! ```
//!
//! Gates run in the order 1, 3, 2 and stop at the first non-ALLOW result,
//! so a traversal attempt against a PULSE intent reports the status
//! violation. Nothing is allowed unless all three gates pass.
//!
//! Gate 1 requires the action to name the active Intent. Callers acting on
//! whatever is active bind with [`EnforcementEngine::bind_to_active`] first.

mod scope;
mod verdict;

pub use scope::{Resolved, Workspace};
pub use verdict::{
    ActionType, Axiom, BlockDiagnostics, DecisionStatus, EscalationTarget, ProposedAction,
    Verdict,
};

use std::path::Path;

use crate::config::GovernanceMode;
use crate::intent::{Intent, IntentProvider, IntentStatus};

pub struct EnforcementEngine<P> {
    provider: P,
    workspace: Workspace,
    mode: GovernanceMode,
}

impl<P: IntentProvider> EnforcementEngine<P> {
    pub fn new(provider: P, workspace_root: impl AsRef<Path>) -> Self {
        Self {
            provider,
            workspace: Workspace::new(workspace_root),
            mode: GovernanceMode::Enforce,
        }
    }

    pub fn with_mode(mut self, mode: GovernanceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> GovernanceMode {
        self.mode
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Bind an action that names no Intent to the active one.
    ///
    /// Callers that act on behalf of "whatever is active" bind first; an
    /// action evaluated unbound is treated as drift.
    pub fn bind_to_active(&self, action: &ProposedAction) -> ProposedAction {
        match (&action.intent_id, self.provider.active_intent()) {
            (None, Some(active)) => action.clone().for_intent(active.id),
            _ => action.clone(),
        }
    }

    /// Evaluate an action against the current active Intent.
    pub fn evaluate_action(&self, action: &ProposedAction) -> Verdict {
        let mut intent = self.provider.active_intent();
        let mut opened = None;
        if intent.is_none() && self.mode == GovernanceMode::Assist {
            match self.provider.open_session_intent(&action.target_path) {
                Ok(created) => {
                    tracing::info!(
                        intent_id = %created.id,
                        target = %action.target_path,
                        "assist mode opened a session intent"
                    );
                    opened = Some(action.clone().for_intent(created.id.clone()));
                    intent = Some(created);
                }
                Err(e) => {
                    tracing::warn!(
                        target = %action.target_path,
                        error = %e,
                        "assist mode could not open an intent"
                    );
                    return Verdict::Allow {
                        reason: "Assist mode: Intent creation failed, action allowed.".into(),
                        intent_id: None,
                    };
                }
            }
        }
        let action = opened.as_ref().unwrap_or(action);
        let verdict = self.evaluate_against(intent.as_ref(), action);

        if !verdict.is_allowed() {
            tracing::info!(
                status = %verdict.status(),
                axiom = verdict.axiom_violated().map(|a| a.number()),
                target = %action.target_path,
                proposed_by = %action.proposed_by,
                message = %verdict.message(),
                mode = %self.mode,
                "action not permitted"
            );
        }

        match self.mode {
            GovernanceMode::Enforce => verdict,
            _ if verdict.is_allowed() => verdict,
            GovernanceMode::Observe => Verdict::Allow {
                reason: format!(
                    "Observe mode: would {} ({})",
                    verdict.status(),
                    verdict.message()
                ),
                intent_id: intent.map(|i| i.id),
            },
            GovernanceMode::Assist => {
                tracing::warn!(
                    status = %verdict.status(),
                    target = %action.target_path,
                    message = %verdict.message(),
                    "assist mode allowed an action that would not be permitted"
                );
                Verdict::Allow {
                    reason: format!(
                        "Assist mode: warning, would {} ({})",
                        verdict.status(),
                        verdict.message()
                    ),
                    intent_id: intent.map(|i| i.id),
                }
            }
        }
    }

    /// Pure evaluation against an explicit Intent.
    pub fn evaluate_against(&self, intent: Option<&Intent>, action: &ProposedAction) -> Verdict {
        let intent = match check_intent_binding(intent, action) {
            Ok(intent) => intent,
            Err(verdict) => return verdict,
        };
        if let Some(verdict) = check_authority(intent) {
            return verdict;
        }
        if let Some(verdict) = self.check_scope(intent, action) {
            return verdict;
        }
        Verdict::Allow {
            reason: format!("Action permitted within Intent \"{}\" scope.", intent.id),
            intent_id: Some(intent.id.clone()),
        }
    }

    fn check_scope(&self, intent: &Intent, action: &ProposedAction) -> Option<Verdict> {
        let mut offending = Vec::new();
        let mut escaped = false;

        for path in action.paths() {
            match self.workspace.resolve(path) {
                Resolved::Inside { absolute, relative } => {
                    if !self
                        .workspace
                        .in_scope(&absolute, &relative, &intent.scope.files)
                    {
                        offending.push(path.to_string());
                    }
                }
                Resolved::Escapes(_) => {
                    escaped = true;
                    offending.push(path.to_string());
                }
            }
        }

        if offending.is_empty() {
            return None;
        }

        let message = if escaped {
            "Path resolves outside the workspace root.".to_string()
        } else {
            format!("Path is not covered by Intent \"{}\" scope.", intent.id)
        };
        Some(Verdict::Block {
            violation: format!(
                "AXIOM 2 VIOLATION: File \"{}\" is outside Intent scope or contains path traversal.",
                offending[0]
            ),
            axiom_violated: Axiom::ScopeValidation,
            remediation: format!(
                "File not in Intent \"{}\" scope. Add it to the scope or create a separate Intent.",
                intent.id
            ),
            intent_id: Some(intent.id.clone()),
            diagnostics: Some(BlockDiagnostics {
                offending_files: offending,
                scope_files: intent.scope.files.clone(),
                message,
            }),
        })
    }
}

fn check_intent_binding<'a>(
    intent: Option<&'a Intent>,
    action: &ProposedAction,
) -> Result<&'a Intent, Verdict> {
    let Some(intent) = intent else {
        return Err(Verdict::Block {
            violation: "AXIOM 1 VIOLATION: No active Intent exists.".into(),
            axiom_violated: Axiom::IntentBinding,
            remediation: "Create an Intent before modifying files.".into(),
            intent_id: None,
            diagnostics: None,
        });
    };

    match action.intent_id.as_deref() {
        None => Err(Verdict::Block {
            violation: format!(
                "DRIFT DETECTED: Action is not bound to an Intent but active Intent is \"{}\".",
                intent.id
            ),
            axiom_violated: Axiom::IntentBinding,
            remediation: "Bind the action to the active Intent before evaluating it.".into(),
            intent_id: Some(intent.id.clone()),
            diagnostics: None,
        }),
        Some(claimed) if claimed != intent.id => Err(Verdict::Block {
            violation: format!(
                "DRIFT DETECTED: Action claims Intent \"{claimed}\" but active Intent is \"{}\".",
                intent.id
            ),
            axiom_violated: Axiom::IntentBinding,
            remediation:
                "Complete and seal the current Intent, or verify this action belongs to the active Intent."
                    .into(),
            intent_id: Some(intent.id.clone()),
            diagnostics: None,
        }),
        _ => Ok(intent),
    }
}

fn check_authority(intent: &Intent) -> Option<Verdict> {
    let id = &intent.id;
    let block = |violation: String, remediation: &str| {
        Some(Verdict::Block {
            violation,
            axiom_violated: Axiom::Authority,
            remediation: remediation.to_string(),
            intent_id: Some(id.clone()),
            diagnostics: None,
        })
    };

    match &intent.status {
        IntentStatus::Pass => None,
        IntentStatus::Pulse => block(
            format!("Intent \"{id}\" is in PULSE status."),
            "Wait for a PASS verdict before modifying files.",
        ),
        IntentStatus::Veto => block(
            format!("Intent \"{id}\" received VETO."),
            "Review the audit report and create a revised Intent.",
        ),
        IntentStatus::Sealed => block(
            format!("Intent \"{id}\" is SEALED."),
            "Create a new Intent for further changes.",
        ),
        IntentStatus::Unknown(status) => Some(Verdict::Escalate {
            escalation_to: EscalationTarget::HumanReview,
            reason: format!("Unknown status: {status}"),
            intent_id: Some(id.clone()),
        }),
    }
}
