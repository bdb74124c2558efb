//! Content classifiers and the argument scanner that feeds them.
//!
//! Classifiers are constructed once at startup and handed to the policies that
//! need them through a `ClassifierRegistry`; nothing here is global.

use std::collections::HashMap;
use std::sync::Arc;

use regex::RegexSet;
use serde_json::Value;

use crate::dsl::{custom, Condition};
use crate::error::{GuardrailError, Result};

/// Opaque detector over a piece of text
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// True if the text should be flagged. Errors reach the rule boundary.
    fn detect(&self, text: &str) -> anyhow::Result<bool>;
}

// ============================================================================
// RegexClassifier
// ============================================================================

/// Flags text matching any of a set of patterns
pub struct RegexClassifier {
    name: String,
    patterns: RegexSet,
}

impl RegexClassifier {
    pub fn new<I, S>(name: impl Into<String>, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();
        let set = RegexSet::new(&patterns).map_err(|source| GuardrailError::InvalidPattern {
            pattern: patterns.join(" | "),
            source,
        })?;
        Ok(Self {
            name: name.into(),
            patterns: set,
        })
    }

    /// Email addresses, phone numbers, US SSNs, card-shaped numbers, IPv4 addresses
    pub fn pii() -> Result<Self> {
        Self::new(
            "pii",
            &[
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                r"\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
                r"\b\d{3}-\d{2}-\d{4}\b",
                r"\b(?:\d[ -]?){13,16}\b",
                r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b",
            ],
        )
    }

    /// Cloud keys, access tokens and private key material
    pub fn secrets() -> Result<Self> {
        Self::new(
            "secrets",
            &[
                r"\bAKIA[0-9A-Z]{16}\b",
                r"\bgh[pousr]_[A-Za-z0-9]{36,}\b",
                r"-----BEGIN (?:RSA |EC |OPENSSH |DSA )?PRIVATE KEY-----",
                r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]{20,}=*",
                r"\bxox[abpr]-[A-Za-z0-9-]{10,}\b",
            ],
        )
    }
}

impl Classifier for RegexClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, text: &str) -> anyhow::Result<bool> {
        Ok(self.patterns.is_match(text))
    }
}

// ============================================================================
// ClassifierRegistry
// ============================================================================

/// Named classifiers available to policies loaded at runtime
#[derive(Clone, Default)]
pub struct ClassifierRegistry {
    classifiers: HashMap<String, Arc<dyn Classifier>>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `pii` and `secrets` regex classifiers
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(RegexClassifier::pii()?));
        registry.register(Arc::new(RegexClassifier::secrets()?));
        Ok(registry)
    }

    /// Register under the classifier's own name, replacing any previous entry
    pub fn register(&mut self, classifier: Arc<dyn Classifier>) {
        self.classifiers
            .insert(classifier.name().to_string(), classifier);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Classifier>> {
        self.classifiers
            .get(name)
            .cloned()
            .ok_or_else(|| GuardrailError::UnknownClassifier(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classifiers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Argument scanning
// ============================================================================

/// Visit every string nested anywhere in `value`; stops at the first hit
pub fn scan_value(value: &Value, classifier: &dyn Classifier) -> anyhow::Result<bool> {
    match value {
        Value::String(text) => {
            if text.trim().is_empty() {
                return Ok(false);
            }
            classifier.detect(text)
        }
        Value::Array(items) => {
            for item in items {
                if scan_value(item, classifier)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Object(map) => {
            for item in map.values() {
                if scan_value(item, classifier)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Predicate: true if the classifier flags any string in the call's arguments,
/// at any nesting depth
pub fn scan_arguments(classifier: Arc<dyn Classifier>) -> Condition {
    custom(move |call, _| {
        for value in call.arguments.values() {
            if scan_value(value, classifier.as_ref())? {
                return Ok(true);
            }
        }
        Ok(false)
    })
}
