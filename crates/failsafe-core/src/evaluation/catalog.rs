//! Validated, compiled pattern registry.
//!
//! Custom patterns come from a YAML file:
//!
//! ```yaml
//! patterns:
//!   - id: ORG001
//!     name: Internal hostname
//!     category: resource
//!     severity: medium
//!     pattern: 'corp\.internal'
//! ```
//!
//! Each entry is validated on its own. A bad entry is logged and skipped; the
//! rest of the file still loads. A custom entry with a built-in id replaces
//! the built-in.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use super::patterns::{HeuristicPattern, DEFAULT_PATTERNS};

/// Longest accepted pattern source.
pub const MAX_PATTERN_LEN: usize = 500;

/// Compiled-program size cap for a single pattern.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub definition: HeuristicPattern,
    pub regex: Regex,
}

#[derive(Debug, Default, Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: Vec<serde_yaml::Value>,
}

/// Patterns keyed by id, in id order.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: BTreeMap<String, CompiledPattern>,
}

impl PatternCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for definition in DEFAULT_PATTERNS {
            catalog.insert(definition.to_pattern());
        }
        catalog
    }

    /// Built-ins plus custom patterns from `path`, if it exists.
    pub fn with_custom_file(path: &Path) -> Self {
        let mut catalog = Self::builtin();
        match fs::read_to_string(path) {
            Ok(text) => {
                let loaded = catalog.load_custom_yaml(&text);
                tracing::debug!(path = %path.display(), loaded, "custom patterns loaded");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read custom patterns");
            }
        }
        catalog
    }

    /// Merge custom patterns from YAML text. Returns how many were accepted.
    pub fn load_custom_yaml(&mut self, text: &str) -> usize {
        let file = match serde_yaml::from_str::<Option<PatternFile>>(text) {
            Ok(Some(file)) => file,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed custom pattern file");
                return 0;
            }
        };

        let mut accepted = 0;
        for (index, raw) in file.patterns.into_iter().enumerate() {
            let pattern: HeuristicPattern = match serde_yaml::from_value(raw) {
                Ok(pattern) => pattern,
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping invalid custom pattern");
                    continue;
                }
            };
            if self.insert(pattern) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Validate, compile and insert. Returns `false` if the pattern was rejected.
    pub fn insert(&mut self, pattern: HeuristicPattern) -> bool {
        if let Err(reason) = validate(&pattern) {
            tracing::warn!(pattern_id = %pattern.id, reason = %reason, "skipping invalid pattern");
            return false;
        }
        let regex = match RegexBuilder::new(&pattern.pattern)
            .case_insensitive(true)
            .multi_line(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
        {
            Ok(regex) => regex,
            Err(e) => {
                tracing::warn!(pattern_id = %pattern.id, error = %e, "skipping uncompilable pattern");
                return false;
            }
        };
        self.patterns.insert(
            pattern.id.clone(),
            CompiledPattern {
                definition: pattern,
                regex,
            },
        );
        true
    }

    pub fn get(&self, id: &str) -> Option<&CompiledPattern> {
        self.patterns.get(id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Enabled patterns in id order.
    pub fn enabled(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.patterns.values().filter(|p| p.definition.enabled)
    }
}

fn validate(pattern: &HeuristicPattern) -> Result<(), String> {
    if pattern.id.trim().is_empty() {
        return Err("id is empty".into());
    }
    if pattern.name.trim().is_empty() {
        return Err("name is empty".into());
    }
    if pattern.pattern.is_empty() {
        return Err("pattern is empty".into());
    }
    if pattern.pattern.len() > MAX_PATTERN_LEN {
        return Err(format!("pattern exceeds {MAX_PATTERN_LEN} characters"));
    }
    if !(0.0..=1.0).contains(&pattern.false_positive_rate) {
        return Err("falsePositiveRate must be within 0..=1".into());
    }
    Ok(())
}
