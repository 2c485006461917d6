use chrono::{DateTime, Utc};
use failsafe_core::clock::format_timestamp;
use failsafe_core::governance::LedgerEventType;
use failsafe_core::intent::RiskGrade;

/// Upper bound on rows returned by [`super::SoaLedger::query`].
pub const MAX_QUERY_ROWS: usize = 500;

/// Filters are combined with AND; unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerQuery {
    pub agent_did: Option<String>,
    pub risk_grade: Option<RiskGrade>,
    pub event_type: Option<LedgerEventType>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub artifact_path: Option<String>,
    /// Defaults to and is capped at [`MAX_QUERY_ROWS`].
    pub limit: Option<usize>,
}

impl LedgerQuery {
    pub(crate) fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(agent) = &self.agent_did {
            clauses.push("agent_did = ?");
            values.push(agent.clone());
        }
        if let Some(grade) = self.risk_grade {
            clauses.push("risk_grade = ?");
            values.push(grade.to_string());
        }
        if let Some(event_type) = self.event_type {
            clauses.push("event_type = ?");
            values.push(event_type.as_str().to_string());
        }
        if let Some(from) = self.from {
            clauses.push("timestamp >= ?");
            values.push(format_timestamp(from));
        }
        if let Some(to) = self.to {
            clauses.push("timestamp <= ?");
            values.push(format_timestamp(to));
        }
        if let Some(path) = &self.artifact_path {
            clauses.push("artifact_path = ?");
            values.push(path.clone());
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = self.limit.unwrap_or(MAX_QUERY_ROWS).min(MAX_QUERY_ROWS);
        let sql = format!(
            "SELECT {} FROM soa_ledger {filter} ORDER BY timestamp DESC, id DESC LIMIT {limit}",
            super::entry::ENTRY_COLUMNS
        );
        (sql, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfiltered_query_is_capped() {
        let query = LedgerQuery {
            limit: Some(10_000),
            ..LedgerQuery::default()
        };
        let (sql, values) = query.to_sql();
        assert!(sql.ends_with("ORDER BY timestamp DESC, id DESC LIMIT 500"));
        assert!(!sql.contains("WHERE"));
        assert!(values.is_empty());
    }

    #[test]
    fn test_filters_bind_in_order() {
        let query = LedgerQuery {
            agent_did: Some("did:myth:judge:1".into()),
            event_type: Some(LedgerEventType::AuditFail),
            artifact_path: Some("src/a.rs".into()),
            ..LedgerQuery::default()
        };
        let (sql, values) = query.to_sql();
        assert!(sql.contains("WHERE agent_did = ? AND event_type = ? AND artifact_path = ?"));
        assert_eq!(values, vec!["did:myth:judge:1", "AUDIT_FAIL", "src/a.rs"]);
    }
}
