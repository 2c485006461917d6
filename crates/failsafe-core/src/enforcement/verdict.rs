use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    FileWrite,
    FileCreate,
    FileDelete,
    FileRename,
}

/// A file-modifying action an agent wants to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub target_path: String,
    /// Rename destination; checked against scope like the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    pub proposed_at: DateTime<Utc>,
    pub proposed_by: String,
}

impl ProposedAction {
    pub fn new(action_type: ActionType, target_path: impl Into<String>, proposed_by: impl Into<String>) -> Self {
        Self {
            action_type,
            target_path: target_path.into(),
            destination_path: None,
            intent_id: None,
            proposed_at: Utc::now(),
            proposed_by: proposed_by.into(),
        }
    }

    pub fn for_intent(mut self, intent_id: impl Into<String>) -> Self {
        self.intent_id = Some(intent_id.into());
        self
    }

    pub fn renamed_to(mut self, destination: impl Into<String>) -> Self {
        self.destination_path = Some(destination.into());
        self
    }

    /// Every path the action touches.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.target_path.as_str()).chain(self.destination_path.as_deref())
    }
}

/// The three authorization rules, numbered as published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axiom {
    /// No action without an active, matching Intent.
    IntentBinding,
    /// Targets must stay inside the workspace and the Intent scope.
    ScopeValidation,
    /// The Intent's verification status must permit writes.
    Authority,
}

impl Axiom {
    pub fn number(&self) -> u8 {
        match self {
            Axiom::IntentBinding => 1,
            Axiom::ScopeValidation => 2,
            Axiom::Authority => 3,
        }
    }
}

impl Serialize for Axiom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl fmt::Display for Axiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axiom {}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationTarget {
    L3Queue,
    HumanReview,
    TribunalAudit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDiagnostics {
    pub offending_files: Vec<String>,
    pub scope_files: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Allow,
    Block,
    Escalate,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionStatus::Allow => f.write_str("ALLOW"),
            DecisionStatus::Block => f.write_str("BLOCK"),
            DecisionStatus::Escalate => f.write_str("ESCALATE"),
        }
    }
}

/// Outcome of evaluating one [`ProposedAction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Verdict {
    Allow {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        intent_id: Option<String>,
    },
    Block {
        violation: String,
        axiom_violated: Axiom,
        remediation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        intent_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostics: Option<BlockDiagnostics>,
    },
    Escalate {
        escalation_to: EscalationTarget,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        intent_id: Option<String>,
    },
}

impl Verdict {
    pub fn status(&self) -> DecisionStatus {
        match self {
            Verdict::Allow { .. } => DecisionStatus::Allow,
            Verdict::Block { .. } => DecisionStatus::Block,
            Verdict::Escalate { .. } => DecisionStatus::Escalate,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow { .. })
    }

    pub fn axiom_violated(&self) -> Option<Axiom> {
        match self {
            Verdict::Block { axiom_violated, .. } => Some(*axiom_violated),
            _ => None,
        }
    }

    pub fn intent_id(&self) -> Option<&str> {
        match self {
            Verdict::Allow { intent_id, .. }
            | Verdict::Block { intent_id, .. }
            | Verdict::Escalate { intent_id, .. } => intent_id.as_deref(),
        }
    }

    /// Reason or violation text.
    pub fn message(&self) -> &str {
        match self {
            Verdict::Allow { reason, .. } | Verdict::Escalate { reason, .. } => reason,
            Verdict::Block { violation, .. } => violation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_wire_shape() {
        let verdict = Verdict::Block {
            violation: "AXIOM 1 VIOLATION: No active Intent exists.".into(),
            axiom_violated: Axiom::IntentBinding,
            remediation: "Create an Intent before modifying files.".into(),
            intent_id: None,
            diagnostics: None,
        };
        assert_eq!(
            serde_json::to_value(&verdict).unwrap(),
            json!({
                "status": "BLOCK",
                "violation": "AXIOM 1 VIOLATION: No active Intent exists.",
                "axiomViolated": 1,
                "remediation": "Create an Intent before modifying files."
            })
        );
    }

    #[test]
    fn test_escalate_wire_shape() {
        let verdict = Verdict::Escalate {
            escalation_to: EscalationTarget::HumanReview,
            reason: "Unknown status: LIMBO".into(),
            intent_id: Some("i-1".into()),
        };
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["status"], "ESCALATE");
        assert_eq!(value["escalationTo"], "HUMAN_REVIEW");
        assert_eq!(value["intentId"], "i-1");
    }

    #[test]
    fn test_rename_touches_both_paths() {
        let action = ProposedAction::new(ActionType::FileRename, "src/a.rs", "scrivener")
            .renamed_to("src/b.rs");
        assert_eq!(action.paths().collect::<Vec<_>>(), vec!["src/a.rs", "src/b.rs"]);
    }
}
