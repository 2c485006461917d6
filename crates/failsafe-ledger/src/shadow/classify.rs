use super::types::{ArchiveFailureRequest, FailureMode};

/// Map matched pattern names and evaluator output to a failure mode.
/// The first pattern with a recognizable keyword decides.
pub fn classify_failure_mode(request: &ArchiveFailureRequest) -> FailureMode {
    for pattern in &request.matched_patterns {
        let pattern = pattern.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| pattern.contains(n));
        if has(&["injection", "xss", "sql"]) {
            return FailureMode::InjectionVulnerability;
        }
        if has(&["secret", "api_key", "api key", "password", "credential"]) {
            return FailureMode::SecretExposure;
        }
        if has(&["pii", "personal", "social security", "credit card"]) {
            return FailureMode::PiiLeak;
        }
        if has(&["complex", "cyclomatic", "nesting"]) {
            return FailureMode::HighComplexity;
        }
        if has(&["logic", "spec"]) {
            return FailureMode::LogicError;
        }
        if has(&["dependency", "import"]) {
            return FailureMode::DependencyConflict;
        }
    }

    if request.quarantined {
        return FailureMode::TrustViolation;
    }

    if let Some(response) = &request.evaluator_response {
        let response = response.to_ascii_lowercase();
        if response.contains("hallucin") {
            return FailureMode::Hallucination;
        }
        if response.contains("spec") || response.contains("requirement") {
            return FailureMode::SpecViolation;
        }
    }

    FailureMode::Other
}

/// AVOID/REQUIRE guidance recorded with the failure.
pub fn negative_constraint(mode: FailureMode, summary: &str) -> String {
    let (avoid, require) = match mode {
        FailureMode::InjectionVulnerability => (
            "Unsanitized user input in SQL/command execution",
            "Input validation and parameterized queries",
        ),
        FailureMode::SecretExposure => (
            "Hardcoded secrets, API keys, or credentials",
            "Environment variables or secure vault access",
        ),
        FailureMode::PiiLeak => (
            "Logging or exposing personally identifiable information",
            "PII masking and access controls",
        ),
        FailureMode::HighComplexity => (
            "Functions exceeding complexity thresholds",
            "Code decomposition and single responsibility",
        ),
        FailureMode::Hallucination => (
            "Generated code without grounding in codebase context",
            "Citation of existing patterns or explicit novelty declaration",
        ),
        FailureMode::LogicError => (
            "Unverified logical assumptions",
            "Test coverage for edge cases",
        ),
        FailureMode::SpecViolation => (
            "Deviation from documented specifications",
            "Spec compliance verification before commit",
        ),
        FailureMode::DependencyConflict => (
            "Unvetted external dependencies",
            "Dependency audit and version pinning",
        ),
        FailureMode::TrustViolation => (
            "Repeated failures within probationary period",
            "Human review for sensitive operations",
        ),
        FailureMode::Other => return format!("AVOID: {summary}"),
    };
    format!("AVOID: {avoid}\nREQUIRE: {require}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(patterns: &[&str]) -> ArchiveFailureRequest {
        ArchiveFailureRequest {
            matched_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            summary: "unexpected output".into(),
            ..ArchiveFailureRequest::default()
        }
    }

    #[test]
    fn test_first_recognized_pattern_wins() {
        assert_eq!(
            classify_failure_mode(&request(&["Hardcoded API Key", "SQL Injection"])),
            FailureMode::SecretExposure
        );
        assert_eq!(
            classify_failure_mode(&request(&["unknown", "Deep Nesting"])),
            FailureMode::HighComplexity
        );
    }

    #[test]
    fn test_fallbacks() {
        let mut quarantined = request(&[]);
        quarantined.quarantined = true;
        assert_eq!(classify_failure_mode(&quarantined), FailureMode::TrustViolation);

        let mut evaluated = request(&[]);
        evaluated.evaluator_response = Some("Likely HALLUCINATED api".into());
        assert_eq!(classify_failure_mode(&evaluated), FailureMode::Hallucination);

        assert_eq!(classify_failure_mode(&request(&[])), FailureMode::Other);
    }

    #[test]
    fn test_constraint_text() {
        assert_eq!(
            negative_constraint(FailureMode::Other, "bad merge"),
            "AVOID: bad merge"
        );
        let text = negative_constraint(FailureMode::PiiLeak, "");
        assert!(text.starts_with("AVOID: "));
        assert!(text.contains("\nREQUIRE: PII masking"));
    }
}
