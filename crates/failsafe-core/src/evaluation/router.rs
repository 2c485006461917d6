use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::heuristics::{Analysis, Finding, HeuristicEngine, SkipReason};
use super::patterns::Severity;
use crate::enforcement::{ActionType, ProposedAction};
use crate::intent::RiskGrade;

/// Highest tier a decision can be assigned.
pub const MAX_TIER: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    R0,
    R1,
    R2,
    R3,
}

impl RiskLevel {
    pub fn from_severity(worst: Option<Severity>) -> Self {
        match worst {
            None => RiskLevel::R0,
            Some(Severity::Low | Severity::Medium) => RiskLevel::R1,
            Some(Severity::High) => RiskLevel::R2,
            Some(Severity::Critical) => RiskLevel::R3,
        }
    }

    fn base_tier(self) -> u8 {
        match self {
            RiskLevel::R0 => 0,
            RiskLevel::R1 => 1,
            RiskLevel::R2 => 2,
            RiskLevel::R3 => 3,
        }
    }

    /// Intent-level grade for this risk.
    pub fn risk_grade(self) -> RiskGrade {
        match self {
            RiskLevel::R0 | RiskLevel::R1 => RiskGrade::L1,
            RiskLevel::R2 => RiskGrade::L2,
            RiskLevel::R3 => RiskGrade::L3,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.base_tier())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Novelty {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triage {
    pub risk: RiskLevel,
    pub novelty: Novelty,
    pub confidence: Confidence,
}

/// Map a risk level and context signals to a review tier in `0..=3`.
///
/// The base tier is the risk level; high novelty or low confidence raises it
/// by one, capped at [`MAX_TIER`].
pub fn determine_tier(risk: RiskLevel, novelty: Novelty, confidence: Confidence) -> u8 {
    let base = risk.base_tier();
    if novelty == Novelty::High || confidence == Confidence::Low {
        (base + 1).min(MAX_TIER)
    } else {
        base
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAction {
    LedgerWrite,
    DeepReview,
    HumanApproval,
}

impl RequiredAction {
    pub fn for_tier(tier: u8) -> Vec<RequiredAction> {
        let mut actions = Vec::new();
        if tier >= 1 {
            actions.push(RequiredAction::LedgerWrite);
        }
        if tier >= 2 {
            actions.push(RequiredAction::DeepReview);
        }
        if tier >= 3 {
            actions.push(RequiredAction::HumanApproval);
        }
        actions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub target_path: String,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    /// Proposed content; when absent the artifact is read from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl EvaluationEvent {
    pub fn new(action_type: ActionType, target_path: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            target_path: target_path.into(),
            action_type,
            intent_id: None,
            content: None,
        }
    }

    pub fn from_action(action: &ProposedAction) -> Self {
        Self {
            intent_id: action.intent_id.clone(),
            ..Self::new(action.action_type, action.target_path.clone())
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub event_id: String,
    pub target_path: String,
    pub tier: u8,
    pub triage: Triage,
    pub risk_grade: RiskGrade,
    pub write_ledger: bool,
    pub invoke_review: bool,
    pub required_actions: Vec<RequiredAction>,
    pub complexity: u32,
    pub findings: Vec<Finding>,
}

/// Where the routed content came from.
enum Artifact {
    Content { text: String, new: bool },
    Missing,
    Unreadable,
}

pub struct EvaluationRouter {
    engine: HeuristicEngine,
    workspace_root: PathBuf,
}

impl EvaluationRouter {
    pub fn new(engine: HeuristicEngine, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            workspace_root: workspace_root.into(),
        }
    }

    pub fn engine(&self) -> &HeuristicEngine {
        &self.engine
    }

    pub fn route(&self, event: &EvaluationEvent) -> RoutingDecision {
        let artifact = self.load_artifact(event);
        let (analysis, novel, readable) = match &artifact {
            Artifact::Content { text, new } => (self.engine.analyze(text), *new, true),
            Artifact::Missing => (Analysis::default(), true, true),
            Artifact::Unreadable => (Analysis::default(), false, false),
        };

        let high_complexity = analysis.complexity > self.engine.config().complexity_high;
        let novelty = if novel {
            Novelty::High
        } else if high_complexity {
            Novelty::Medium
        } else {
            Novelty::Low
        };
        let confidence = if !readable || analysis.skipped == Some(SkipReason::Oversized) {
            Confidence::Low
        } else {
            Confidence::High
        };
        let risk = RiskLevel::from_severity(analysis.worst_severity());
        let tier = determine_tier(risk, novelty, confidence);

        let decision = RoutingDecision {
            event_id: event.id.clone(),
            target_path: event.target_path.clone(),
            tier,
            triage: Triage {
                risk,
                novelty,
                confidence,
            },
            risk_grade: risk.risk_grade(),
            write_ledger: tier >= 1,
            invoke_review: tier >= 2,
            required_actions: RequiredAction::for_tier(tier),
            complexity: analysis.complexity,
            findings: analysis.findings,
        };

        tracing::debug!(
            event_id = %decision.event_id,
            target = %decision.target_path,
            tier,
            risk = %risk,
            findings = decision.findings.len(),
            "event routed"
        );
        decision
    }

    fn load_artifact(&self, event: &EvaluationEvent) -> Artifact {
        let creating = event.action_type == ActionType::FileCreate;
        if let Some(text) = &event.content {
            return Artifact::Content {
                text: text.clone(),
                new: creating,
            };
        }
        let path = self.resolve(&event.target_path);
        match fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Artifact::Content {
                    text,
                    new: creating,
                },
                Err(_) => Artifact::Unreadable,
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Artifact::Missing,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "artifact unreadable");
                Artifact::Unreadable
            }
        }
    }

    fn resolve(&self, target: &str) -> PathBuf {
        let target = Path::new(target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.workspace_root.join(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{HeuristicsConfig, PatternCatalog};
    use tempfile::tempdir;

    fn router(root: &Path) -> EvaluationRouter {
        let engine = HeuristicEngine::new(PatternCatalog::builtin(), HeuristicsConfig::default());
        EvaluationRouter::new(engine, root)
    }

    #[test]
    fn test_determine_tier_is_pure_table() {
        use Confidence as C;
        use Novelty as N;
        use RiskLevel as R;

        assert_eq!(determine_tier(R::R0, N::Low, C::High), 0);
        assert_eq!(determine_tier(R::R1, N::Medium, C::High), 1);
        assert_eq!(determine_tier(R::R2, N::Low, C::High), 2);
        assert_eq!(determine_tier(R::R0, N::High, C::High), 1);
        assert_eq!(determine_tier(R::R1, N::Low, C::Low), 2);
        assert_eq!(determine_tier(R::R3, N::High, C::Low), 3);
    }

    #[test]
    fn test_clean_existing_file_is_tier_zero() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn main() {}\n").unwrap();
        let decision = router(dir.path()).route(&EvaluationEvent::new(ActionType::FileWrite, "lib.rs"));
        assert_eq!(decision.tier, 0);
        assert!(!decision.write_ledger);
        assert!(decision.required_actions.is_empty());
        assert_eq!(decision.risk_grade, RiskGrade::L1);
    }

    #[test]
    fn test_critical_finding_routes_to_top_tier() {
        let dir = tempdir().unwrap();
        let event = EvaluationEvent::new(ActionType::FileWrite, "db.js")
            .with_content("db.query(\"SELECT * FROM t WHERE id=\" + id)");
        let decision = router(dir.path()).route(&event);
        assert_eq!(decision.triage.risk, RiskLevel::R3);
        assert_eq!(decision.tier, 3);
        assert!(decision.invoke_review);
        assert_eq!(
            decision.required_actions,
            vec![
                RequiredAction::LedgerWrite,
                RequiredAction::DeepReview,
                RequiredAction::HumanApproval
            ]
        );
        assert_eq!(decision.risk_grade, RiskGrade::L3);
    }

    #[test]
    fn test_new_artifact_raises_tier() {
        let dir = tempdir().unwrap();
        let event = EvaluationEvent::new(ActionType::FileCreate, "new.rs").with_content("let x = 1;");
        let decision = router(dir.path()).route(&event);
        assert_eq!(decision.triage.novelty, Novelty::High);
        assert_eq!(decision.tier, 1);
        assert!(decision.write_ledger);
        assert!(!decision.invoke_review);
    }

    #[test]
    fn test_unreadable_artifact_lowers_confidence() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        let decision = router(dir.path()).route(&EvaluationEvent::new(ActionType::FileWrite, "blob.bin"));
        assert_eq!(decision.triage.confidence, Confidence::Low);
        assert_eq!(decision.tier, 1);
    }
}
