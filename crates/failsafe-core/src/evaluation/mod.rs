//! Risk triage for proposed artifacts.
//!
//! ```text
//! EvaluationEvent ──► HeuristicEngine ──► findings + complexity
//!                                                │
//!                         novelty, confidence ───┤
//!                                                ▼
//!                                   determine_tier ──► RoutingDecision
//! ```
//!
//! Tier 0 needs no further scrutiny. Tier 1 is recorded in the ledger, tier 2
//! adds a deep review and tier 3 requires human approval.

mod catalog;
mod heuristics;
mod patterns;
mod router;

pub use catalog::{CompiledPattern, PatternCatalog, MAX_PATTERN_LEN};
pub use heuristics::{
    cyclomatic_complexity, Analysis, Finding, FindingLocation, HeuristicEngine, SkipReason,
    COMPLEXITY_FINDING_ID,
};
pub use patterns::{HeuristicPattern, PatternCategory, PatternDefinition, Severity, DEFAULT_PATTERNS};
pub use router::{
    determine_tier, Confidence, EvaluationEvent, EvaluationRouter, Novelty, RequiredAction,
    RiskLevel, RoutingDecision, Triage, MAX_TIER,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Larger content is not scanned and routes with low confidence.
    pub max_content_bytes: usize,
    /// Complexity above this yields a medium finding.
    pub complexity_medium: u32,
    /// Complexity above this yields a high finding.
    pub complexity_high: u32,
    /// Custom pattern file; defaults to `.failsafe/config/custom_patterns.yaml`.
    pub custom_patterns: Option<PathBuf>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: 1024 * 1024,
            complexity_medium: 10,
            complexity_high: 20,
            custom_patterns: None,
        }
    }
}
