use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternCategory {
    Injection,
    Authentication,
    Cryptography,
    Secrets,
    Pii,
    Resource,
    Logic,
    Complexity,
    Existence,
    Dependency,
}

/// A regex rule, either built in or loaded from the custom pattern file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicPattern {
    pub id: String,
    pub name: String,
    pub category: PatternCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    pub pattern: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub remediation: String,
    #[serde(default)]
    pub false_positive_rate: f32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Built-in rule definition.
pub struct PatternDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub category: PatternCategory,
    pub severity: Severity,
    pub cwe: Option<&'static str>,
    pub pattern: &'static str,
    pub description: &'static str,
    pub remediation: &'static str,
    pub false_positive_rate: f32,
}

impl PatternDefinition {
    pub fn to_pattern(&self) -> HeuristicPattern {
        HeuristicPattern {
            id: self.id.to_string(),
            name: self.name.to_string(),
            category: self.category,
            severity: self.severity,
            cwe: self.cwe.map(str::to_string),
            pattern: self.pattern.to_string(),
            description: self.description.to_string(),
            remediation: self.remediation.to_string(),
            false_positive_rate: self.false_positive_rate,
            enabled: true,
        }
    }
}

/// Static default catalog.
pub static DEFAULT_PATTERNS: &[PatternDefinition] = &[
    PatternDefinition {
        id: "INJ001",
        name: "SQL Injection",
        category: PatternCategory::Injection,
        severity: Severity::Critical,
        cwe: Some("CWE-89"),
        pattern: r"\b(execute|query|raw)\s*\([^)]*\+[^)]*\)",
        description: "String concatenation inside a database query call",
        remediation: "Use parameterized queries or prepared statements",
        false_positive_rate: 0.15,
    },
    PatternDefinition {
        id: "INJ002",
        name: "Command Injection",
        category: PatternCategory::Injection,
        severity: Severity::Critical,
        cwe: Some("CWE-78"),
        pattern: r"\b(exec|spawn|system)\s*\([^)]*\$\{",
        description: "Interpolated value passed to a process spawn",
        remediation: "Pass arguments as a list and validate inputs",
        false_positive_rate: 0.1,
    },
    PatternDefinition {
        id: "SEC001",
        name: "Hardcoded API Key",
        category: PatternCategory::Secrets,
        severity: Severity::Critical,
        cwe: Some("CWE-798"),
        pattern: r#"(api[_-]?key|apikey)\s*[:=]\s*["'][a-zA-Z0-9]{20,}"#,
        description: "API key literal assigned in source",
        remediation: "Load credentials from the environment or a secret manager",
        false_positive_rate: 0.05,
    },
    PatternDefinition {
        id: "SEC002",
        name: "Hardcoded Password",
        category: PatternCategory::Secrets,
        severity: Severity::Critical,
        cwe: Some("CWE-259"),
        pattern: r#"(password|passwd|pwd)\s*[:=]\s*["'][^'"]{8,}"#,
        description: "Password literal assigned in source",
        remediation: "Load credentials from the environment or a secret manager",
        false_positive_rate: 0.1,
    },
    PatternDefinition {
        id: "PII001",
        name: "Social Security Number",
        category: PatternCategory::Pii,
        severity: Severity::High,
        cwe: Some("CWE-359"),
        pattern: r"\b\d{3}-\d{2}-\d{4}\b",
        description: "Value shaped like a US social security number",
        remediation: "Remove personal data from source and fixtures",
        false_positive_rate: 0.2,
    },
    PatternDefinition {
        id: "PII002",
        name: "Credit Card Number",
        category: PatternCategory::Pii,
        severity: Severity::High,
        cwe: Some("CWE-359"),
        pattern: r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13})\b",
        description: "Value shaped like a payment card number",
        remediation: "Remove card data; use tokenized test numbers",
        false_positive_rate: 0.1,
    },
    PatternDefinition {
        id: "CMP001_HEURISTIC",
        name: "Deep Nesting",
        category: PatternCategory::Complexity,
        severity: Severity::Medium,
        cwe: None,
        pattern: r"\{[^}]*\{[^}]*\{[^}]*\{[^}]*\{",
        description: "Five or more nested blocks",
        remediation: "Extract nested logic into functions",
        false_positive_rate: 0.3,
    },
];
