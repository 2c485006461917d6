//! Enforcement, triage and ledger recording composed into one call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use crate::config::{FailsafePaths, GovernanceConfig};
use crate::enforcement::{EnforcementEngine, ProposedAction, Verdict};
use crate::evaluation::{EvaluationEvent, EvaluationRouter, HeuristicEngine, RoutingDecision};
use crate::intent::{IntentProvider, RiskGrade};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEventType {
    Proposal,
    EvaluationRouted,
    AuditPass,
    AuditFail,
    #[serde(rename = "L3_QUEUED")]
    L3Queued,
    #[serde(rename = "L3_APPROVED")]
    L3Approved,
    #[serde(rename = "L3_REJECTED")]
    L3Rejected,
    TrustUpdate,
    PenaltyApplied,
    QuarantineStart,
    QuarantineEnd,
    DivergenceDeclared,
    DivergenceResolved,
    SystemEvent,
}

impl LedgerEventType {
    pub const ALL: [LedgerEventType; 14] = [
        LedgerEventType::Proposal,
        LedgerEventType::EvaluationRouted,
        LedgerEventType::AuditPass,
        LedgerEventType::AuditFail,
        LedgerEventType::L3Queued,
        LedgerEventType::L3Approved,
        LedgerEventType::L3Rejected,
        LedgerEventType::TrustUpdate,
        LedgerEventType::PenaltyApplied,
        LedgerEventType::QuarantineStart,
        LedgerEventType::QuarantineEnd,
        LedgerEventType::DivergenceDeclared,
        LedgerEventType::DivergenceResolved,
        LedgerEventType::SystemEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventType::Proposal => "PROPOSAL",
            LedgerEventType::EvaluationRouted => "EVALUATION_ROUTED",
            LedgerEventType::AuditPass => "AUDIT_PASS",
            LedgerEventType::AuditFail => "AUDIT_FAIL",
            LedgerEventType::L3Queued => "L3_QUEUED",
            LedgerEventType::L3Approved => "L3_APPROVED",
            LedgerEventType::L3Rejected => "L3_REJECTED",
            LedgerEventType::TrustUpdate => "TRUST_UPDATE",
            LedgerEventType::PenaltyApplied => "PENALTY_APPLIED",
            LedgerEventType::QuarantineStart => "QUARANTINE_START",
            LedgerEventType::QuarantineEnd => "QUARANTINE_END",
            LedgerEventType::DivergenceDeclared => "DIVERGENCE_DECLARED",
            LedgerEventType::DivergenceResolved => "DIVERGENCE_RESOLVED",
            LedgerEventType::SystemEvent => "SYSTEM_EVENT",
        }
    }
}

impl fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown ledger event type: {s}"))
    }
}

/// A domain event to be recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAppendRequest {
    pub event_type: LedgerEventType,
    pub agent_did: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_trust_at_action: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_grade: Option<RiskGrade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overseer_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overseer_decision: Option<String>,
    #[serde(default)]
    pub gdpr_trigger: bool,
}

impl LedgerAppendRequest {
    pub fn new(event_type: LedgerEventType, agent_did: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            agent_did: agent_did.into(),
            payload,
            agent_trust_at_action: None,
            model_version: None,
            artifact_path: None,
            artifact_hash: None,
            risk_grade: None,
            verification_method: None,
            verification_result: None,
            sentinel_confidence: None,
            overseer_did: None,
            overseer_decision: None,
            gdpr_trigger: false,
        }
    }

    pub fn with_artifact(mut self, path: impl Into<String>, hash: Option<String>) -> Self {
        self.artifact_path = Some(path.into());
        self.artifact_hash = hash;
        self
    }

    pub fn with_risk_grade(mut self, grade: RiskGrade) -> Self {
        self.risk_grade = Some(grade);
        self
    }
}

/// Append-only sink for domain events.
pub trait LedgerRecorder {
    /// Returns the id of the new entry.
    fn append_entry(&self, request: LedgerAppendRequest) -> anyhow::Result<i64>;
}

impl<L: LedgerRecorder + ?Sized> LedgerRecorder for &L {
    fn append_entry(&self, request: LedgerAppendRequest) -> anyhow::Result<i64> {
        (**self).append_entry(request)
    }
}

/// Collects requests in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    entries: Mutex<Vec<LedgerAppendRequest>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerAppendRequest> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl LedgerRecorder for MemoryRecorder {
    fn append_entry(&self, request: LedgerAppendRequest) -> anyhow::Result<i64> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.push(request);
        Ok(entries.len() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_entry_id: Option<i64>,
}

pub struct GovernancePipeline<P, L> {
    enforcement: EnforcementEngine<P>,
    router: EvaluationRouter,
    recorder: L,
    agent_did: String,
}

impl<P: IntentProvider, L: LedgerRecorder> GovernancePipeline<P, L> {
    pub fn new(
        enforcement: EnforcementEngine<P>,
        router: EvaluationRouter,
        recorder: L,
        agent_did: impl Into<String>,
    ) -> Self {
        Self {
            enforcement,
            router,
            recorder,
            agent_did: agent_did.into(),
        }
    }

    /// Wire the pipeline from workspace configuration.
    pub fn from_config(
        provider: P,
        recorder: L,
        paths: &FailsafePaths,
        config: &GovernanceConfig,
        agent_did: impl Into<String>,
    ) -> Self {
        let mut heuristics = config.heuristics.clone();
        if heuristics.custom_patterns.is_none() {
            heuristics.custom_patterns = Some(paths.custom_patterns_file());
        }
        let root = paths.workspace_root();
        let enforcement = EnforcementEngine::new(provider, root).with_mode(config.mode);
        let router = EvaluationRouter::new(HeuristicEngine::from_config(heuristics), root);
        Self::new(enforcement, router, recorder, agent_did)
    }

    pub fn enforcement(&self) -> &EnforcementEngine<P> {
        &self.enforcement
    }

    pub fn router(&self) -> &EvaluationRouter {
        &self.router
    }

    pub fn recorder(&self) -> &L {
        &self.recorder
    }

    /// Enforce, then triage allowed actions and record the routing when the
    /// tier calls for it. Ledger failures propagate.
    ///
    /// An action that names no Intent is bound to the active one.
    pub fn handle_action(
        &self,
        action: &ProposedAction,
        content: Option<&str>,
    ) -> anyhow::Result<PipelineOutcome> {
        let action = &self.enforcement.bind_to_active(action);
        let verdict = self.enforcement.evaluate_action(action);
        if !verdict.is_allowed() {
            return Ok(PipelineOutcome {
                verdict,
                routing: None,
                ledger_entry_id: None,
            });
        }

        let mut event = EvaluationEvent::from_action(action);
        if event.intent_id.is_none() {
            event.intent_id = verdict.intent_id().map(str::to_string);
        }
        if let Some(content) = content {
            event = event.with_content(content);
        }
        let routing = self.router.route(&event);

        let ledger_entry_id = if routing.write_ledger {
            let request = LedgerAppendRequest::new(
                LedgerEventType::EvaluationRouted,
                self.agent_did.clone(),
                serde_json::json!({
                    "eventId": routing.event_id,
                    "intentId": event.intent_id,
                    "tier": routing.tier,
                    "triage": routing.triage,
                    "requiredActions": routing.required_actions,
                    "findings": routing.findings.iter().map(|f| &f.pattern_id).collect::<Vec<_>>(),
                }),
            )
            .with_artifact(action.target_path.clone(), content.map(crate::crypto::sha256_hex))
            .with_risk_grade(routing.risk_grade);
            let id = self.recorder.append_entry(request)?;
            tracing::info!(
                entry_id = id,
                tier = routing.tier,
                target = %action.target_path,
                "evaluation routed to ledger"
            );
            Some(id)
        } else {
            None
        };

        Ok(PipelineOutcome {
            verdict,
            routing: Some(routing),
            ledger_entry_id,
        })
    }
}
