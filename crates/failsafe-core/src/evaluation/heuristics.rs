use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::catalog::{CompiledPattern, PatternCatalog};
use super::patterns::{PatternCategory, Severity};
use super::HeuristicsConfig;

/// Id reported for the complexity finding.
pub const COMPLEXITY_FINDING_ID: &str = "CMP001";

const SNIPPET_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingLocation {
    pub line: usize,
    pub column: usize,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub pattern_id: String,
    pub name: String,
    pub category: PatternCategory,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    pub location: FindingLocation,
}

/// Why content was not scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Empty,
    Oversized,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub findings: Vec<Finding>,
    pub complexity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl Analysis {
    pub fn worst_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// Regex scanner over a pattern catalog plus a decision-point complexity count.
#[derive(Debug, Clone)]
pub struct HeuristicEngine {
    catalog: PatternCatalog,
    config: HeuristicsConfig,
}

impl HeuristicEngine {
    pub fn new(catalog: PatternCatalog, config: HeuristicsConfig) -> Self {
        Self { catalog, config }
    }

    /// Built-ins plus the custom pattern file named in `config`, if any.
    pub fn from_config(config: HeuristicsConfig) -> Self {
        let catalog = match &config.custom_patterns {
            Some(path) => PatternCatalog::with_custom_file(path),
            None => PatternCatalog::builtin(),
        };
        Self::new(catalog, config)
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &HeuristicsConfig {
        &self.config
    }

    pub fn analyze(&self, content: &str) -> Analysis {
        if content.is_empty() {
            return Analysis {
                skipped: Some(SkipReason::Empty),
                ..Analysis::default()
            };
        }
        if content.len() > self.config.max_content_bytes {
            tracing::warn!(
                size = content.len(),
                limit = self.config.max_content_bytes,
                "content too large for heuristic analysis"
            );
            return Analysis {
                skipped: Some(SkipReason::Oversized),
                ..Analysis::default()
            };
        }

        let mut findings: Vec<Finding> = self
            .catalog
            .enabled()
            .filter_map(|pattern| first_match(pattern, content))
            .collect();

        let complexity = cyclomatic_complexity(content);
        if complexity > self.config.complexity_medium {
            let severity = if complexity > self.config.complexity_high {
                Severity::High
            } else {
                Severity::Medium
            };
            findings.push(Finding {
                pattern_id: COMPLEXITY_FINDING_ID.to_string(),
                name: "High Cyclomatic Complexity".to_string(),
                category: PatternCategory::Complexity,
                severity,
                cwe: None,
                location: FindingLocation {
                    line: 1,
                    column: 1,
                    snippet: format!("Cyclomatic complexity: {complexity}"),
                },
            });
        }

        Analysis {
            findings,
            complexity,
            skipped: None,
        }
    }
}

fn first_match(pattern: &CompiledPattern, content: &str) -> Option<Finding> {
    let found = pattern.regex.find(content)?;
    let line_start = content[..found.start()].rfind('\n').map_or(0, |i| i + 1);
    let line_end = content[found.start()..]
        .find('\n')
        .map_or(content.len(), |i| found.start() + i);
    let line = content[..found.start()].matches('\n').count() + 1;
    let column = content[line_start..found.start()].chars().count() + 1;
    let snippet = content[line_start..line_end]
        .trim()
        .chars()
        .take(SNIPPET_MAX_CHARS)
        .collect();

    let def = &pattern.definition;
    Some(Finding {
        pattern_id: def.id.clone(),
        name: def.name.clone(),
        category: def.category,
        severity: def.severity,
        cwe: def.cwe.clone(),
        location: FindingLocation {
            line,
            column,
            snippet,
        },
    })
}

fn decision_points() -> &'static [Regex] {
    static DECISION_POINTS: OnceLock<Vec<Regex>> = OnceLock::new();
    DECISION_POINTS.get_or_init(|| {
        [
            r"\bif\s*\(",
            r"\belse\s+if\s*\(",
            r"\bfor\s*\(",
            r"\bwhile\s*\(",
            r"\bswitch\s*\(",
            r"\bcase\s+",
            r"\bcatch\s*\(",
            r"\?\s*[^:]+\s*:",
            r"&&",
            r"\|\|",
        ]
        .iter()
        .filter_map(|src| Regex::new(src).ok())
        .collect()
    })
}

/// Base 1 plus one per decision-introducing construct.
pub fn cyclomatic_complexity(content: &str) -> u32 {
    let points: usize = decision_points()
        .iter()
        .map(|re| re.find_iter(content).count())
        .sum();
    1 + u32::try_from(points).unwrap_or(u32::MAX - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> HeuristicEngine {
        HeuristicEngine::new(PatternCatalog::builtin(), HeuristicsConfig::default())
    }

    #[test]
    fn test_complexity_counts_decision_points() {
        assert_eq!(cyclomatic_complexity("let x = 1;"), 1);
        let src = "if (a && b) { for (;;) {} } while (x || y) {}";
        // if, for, while, &&, ||
        assert_eq!(cyclomatic_complexity(src), 6);
    }

    #[test]
    fn test_else_if_counts_twice() {
        // `else if (` matches both the `if (` and `else if (` constructs
        assert_eq!(cyclomatic_complexity("if (a) {} else if (b) {}"), 4);
    }

    #[test]
    fn test_finding_location_and_snippet() {
        let content = "const a = 1;\n   const apiKey = \"abcdefghijklmnopqrstuvwx\";\n";
        let analysis = engine().analyze(content);
        let finding = analysis
            .findings
            .iter()
            .find(|f| f.pattern_id == "SEC001")
            .unwrap();
        assert_eq!(finding.location.line, 2);
        assert_eq!(finding.location.column, 10);
        assert!(finding.location.snippet.starts_with("const apiKey"));
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let analysis = engine().analyze("PASSWORD = 'hunter2hunter2'");
        assert!(analysis.findings.iter().any(|f| f.pattern_id == "SEC002"));
    }

    #[test]
    fn test_snippet_truncated() {
        let content = format!("ssn 123-45-6789 {}", "x".repeat(300));
        let analysis = engine().analyze(&content);
        let finding = &analysis.findings[0];
        assert_eq!(finding.pattern_id, "PII001");
        assert_eq!(finding.location.snippet.chars().count(), 100);
    }

    #[test]
    fn test_complexity_thresholds() {
        let medium = "if (a) {}\n".repeat(10);
        let analysis = engine().analyze(&medium);
        let cmp = analysis
            .findings
            .iter()
            .find(|f| f.pattern_id == COMPLEXITY_FINDING_ID)
            .unwrap();
        assert_eq!(cmp.severity, Severity::Medium);
        assert_eq!(cmp.location.snippet, "Cyclomatic complexity: 11");

        let high = "if (a) {}\n".repeat(20);
        let analysis = engine().analyze(&high);
        let cmp = analysis
            .findings
            .iter()
            .find(|f| f.pattern_id == COMPLEXITY_FINDING_ID)
            .unwrap();
        assert_eq!(cmp.severity, Severity::High);

        let low = "if (a) {}\n".repeat(9);
        assert!(engine().analyze(&low).findings.is_empty());
    }

    #[test]
    fn test_empty_and_oversized_content_skipped() {
        assert_eq!(engine().analyze("").skipped, Some(SkipReason::Empty));

        let config = HeuristicsConfig {
            max_content_bytes: 8,
            ..HeuristicsConfig::default()
        };
        let small = HeuristicEngine::new(PatternCatalog::builtin(), config);
        let analysis = small.analyze("password = 'hunter2hunter2'");
        assert_eq!(analysis.skipped, Some(SkipReason::Oversized));
        assert!(analysis.findings.is_empty());
    }

    #[test]
    fn test_disabled_pattern_not_reported() {
        let mut catalog = PatternCatalog::builtin();
        catalog.load_custom_yaml(
            "patterns:\n  - id: PII001\n    name: SSN\n    category: pii\n    severity: high\n    pattern: '\\d{3}-\\d{2}-\\d{4}'\n    enabled: false\n",
        );
        let engine = HeuristicEngine::new(catalog, HeuristicsConfig::default());
        assert!(engine.analyze("123-45-6789").findings.is_empty());
    }
}
