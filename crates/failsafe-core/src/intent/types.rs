use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of an Intent purpose, in characters.
pub const MAX_PURPOSE_LEN: usize = 200;

/// Verification status of an Intent.
///
/// Unrecognized values read from disk are preserved as [`IntentStatus::Unknown`]
/// so enforcement can escalate them instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntentStatus {
    /// Awaiting verification.
    Pulse,
    Pass,
    Veto,
    /// Terminal; no further writes.
    Sealed,
    Unknown(String),
}

impl IntentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            IntentStatus::Pulse => "PULSE",
            IntentStatus::Pass => "PASS",
            IntentStatus::Veto => "VETO",
            IntentStatus::Sealed => "SEALED",
            IntentStatus::Unknown(s) => s,
        }
    }
}

impl From<String> for IntentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PULSE" => IntentStatus::Pulse,
            "PASS" => IntentStatus::Pass,
            "VETO" => IntentStatus::Veto,
            "SEALED" => IntentStatus::Sealed,
            _ => IntentStatus::Unknown(s),
        }
    }
}

impl From<IntentStatus> for String {
    fn from(status: IntentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    Feature,
    Refactor,
    Bugfix,
    Security,
    Docs,
}

/// Coarse risk grade declared for an Intent's scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskGrade {
    #[default]
    L1,
    L2,
    L3,
}

impl fmt::Display for RiskGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskGrade::L1 => "L1",
            RiskGrade::L2 => "L2",
            RiskGrade::L3 => "L3",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentScope {
    /// Workspace-relative paths or globs, in declaration order.
    pub files: Vec<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub risk_grade: RiskGrade,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines_of_code: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentEvidence {
    pub tests_passed: bool,
    pub build_succeeded: bool,
    pub visual_verified: bool,
    pub sentinel_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

/// A declared unit of authorized work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub id: String,
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub created_at: DateTime<Utc>,
    pub purpose: String,
    pub scope: IntentScope,
    pub status: IntentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<IntentEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_ref: Option<String>,
    pub metadata: IntentMetadata,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_at: Option<DateTime<Utc>>,
}

impl Intent {
    /// New PULSE intent with a fresh id.
    pub fn new(
        intent_type: IntentType,
        purpose: impl Into<String>,
        scope: IntentScope,
        metadata: IntentMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            intent_type,
            created_at: now,
            purpose: purpose.into(),
            scope,
            status: IntentStatus::Pulse,
            blueprint: None,
            evidence: None,
            merkle_ref: None,
            metadata,
            updated_at: now,
            sealed_at: None,
        }
    }

    /// Structural checks applied to intents read from disk.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("intent id is empty".to_string());
        }
        if self.purpose.chars().count() > MAX_PURPOSE_LEN {
            return Err(format!("purpose exceeds {MAX_PURPOSE_LEN} characters"));
        }
        Ok(())
    }
}

/// Lifecycle events recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryEvent {
    Created,
    StatusChanged,
    EvidenceUpdated,
    Sealed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Intent {
        Intent::new(
            IntentType::Feature,
            "Add retry to sync client",
            IntentScope {
                files: vec!["src/sync/**".into()],
                ..IntentScope::default()
            },
            IntentMetadata {
                author: "dev".into(),
                ..IntentMetadata::default()
            },
        )
    }

    #[test]
    fn test_new_intent_starts_in_pulse() {
        let intent = sample();
        assert_eq!(intent.status, IntentStatus::Pulse);
        assert!(intent.validate().is_ok());
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value["status"] = "LIMBO".into();
        let intent: Intent = serde_json::from_value(value).unwrap();
        assert_eq!(intent.status, IntentStatus::Unknown("LIMBO".into()));
        assert_eq!(serde_json::to_value(&intent).unwrap()["status"], "LIMBO");
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["type"], "feature");
        assert_eq!(value["status"], "PULSE");
        assert_eq!(value["scope"]["riskGrade"], "L1");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("sealedAt").is_none());
    }

    #[test]
    fn test_purpose_length_is_bounded() {
        let mut intent = sample();
        intent.purpose = "x".repeat(MAX_PURPOSE_LEN + 1);
        assert!(intent.validate().is_err());
    }
}
