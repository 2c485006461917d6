use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! sql_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| format!("unknown {}: {s}", stringify!($name)))
            }
        }
    };
}

sql_enum!(FailureMode {
    Hallucination => "HALLUCINATION",
    InjectionVulnerability => "INJECTION_VULNERABILITY",
    LogicError => "LOGIC_ERROR",
    SpecViolation => "SPEC_VIOLATION",
    HighComplexity => "HIGH_COMPLEXITY",
    SecretExposure => "SECRET_EXPOSURE",
    PiiLeak => "PII_LEAK",
    DependencyConflict => "DEPENDENCY_CONFLICT",
    TrustViolation => "TRUST_VIOLATION",
    Other => "OTHER",
});

sql_enum!(RemediationStatus {
    Unresolved => "UNRESOLVED",
    InProgress => "IN_PROGRESS",
    Resolved => "RESOLVED",
    WontFix => "WONT_FIX",
    Superseded => "SUPERSEDED",
});

impl RemediationStatus {
    /// Statuses that close a record for retention purposes.
    pub const RESOLVED_CLASS: [RemediationStatus; 3] = [
        RemediationStatus::Resolved,
        RemediationStatus::WontFix,
        RemediationStatus::Superseded,
    ];

    pub fn is_resolved_class(&self) -> bool {
        Self::RESOLVED_CLASS.contains(self)
    }
}

/// A forensic record of a failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowGenomeEntry {
    pub id: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_ref: Option<i64>,
    pub agent_did: String,
    pub input_vector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_context: Option<String>,
    pub failure_mode: FailureMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causal_vector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_constraint: Option<String>,
    pub remediation_status: RemediationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

pub(crate) const SHADOW_COLUMNS: &str = "id, created_at, updated_at, ledger_ref, agent_did, \
     input_vector, decision_rationale, environment_context, failure_mode, causal_vector, \
     negative_constraint, remediation_status, remediation_notes, resolved_at, resolved_by, \
     did_hash, signature, signature_timestamp, created_by, updated_by";

fn parse_column<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

impl ShadowGenomeEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            ledger_ref: row.get(3)?,
            agent_did: row.get(4)?,
            input_vector: row.get(5)?,
            decision_rationale: row.get(6)?,
            environment_context: row.get(7)?,
            failure_mode: parse_column(row, 8)?,
            causal_vector: row.get(9)?,
            negative_constraint: row.get(10)?,
            remediation_status: parse_column(row, 11)?,
            remediation_notes: row.get(12)?,
            resolved_at: row.get(13)?,
            resolved_by: row.get(14)?,
            did_hash: row.get(15)?,
            signature: row.get(16)?,
            signature_timestamp: row.get(17)?,
            created_by: row.get(18)?,
            updated_by: row.get(19)?,
        })
    }
}

/// Input for [`super::ShadowGenomeStore::archive_failure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveFailureRequest {
    pub agent_did: String,
    pub input_vector: String,
    /// Names or ids of the heuristic patterns that fired.
    pub matched_patterns: Vec<String>,
    /// One-line verdict summary.
    pub summary: String,
    /// Free-text evaluator output, checked for hallucination and requirement-violation hints.
    pub evaluator_response: Option<String>,
    pub quarantined: bool,
    pub decision_rationale: Option<String>,
    pub environment_context: Option<String>,
    pub causal_vector: Option<String>,
    pub ledger_ref: Option<i64>,
    pub created_by: Option<String>,
}

/// Unresolved records grouped by failure mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePattern {
    pub failure_mode: FailureMode,
    pub count: u64,
    pub agent_dids: Vec<String>,
    /// Up to three causal vectors.
    pub recent_causes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_check_constraints() {
        assert_eq!(FailureMode::PiiLeak.as_str(), "PII_LEAK");
        assert_eq!(
            serde_json::to_value(RemediationStatus::WontFix).unwrap(),
            "WONT_FIX"
        );
        assert_eq!("in_progress".parse::<RemediationStatus>().unwrap(), RemediationStatus::InProgress);
        assert!("DONE".parse::<RemediationStatus>().is_err());
    }

    #[test]
    fn test_resolved_class() {
        assert!(RemediationStatus::WontFix.is_resolved_class());
        assert!(!RemediationStatus::InProgress.is_resolved_class());
        assert!(!RemediationStatus::Unresolved.is_resolved_class());
    }
}
