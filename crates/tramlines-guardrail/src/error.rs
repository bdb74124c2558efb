use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or wiring up guardrails.
///
/// Everything except `Blocked` is a configuration or integration mistake and is
/// surfaced immediately. Runtime data problems inside predicates never reach
/// this type; they evaluate to `false` or are absorbed at the rule boundary.
#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("call history cannot be empty")]
    EmptyHistory,

    #[error("rule '{rule}' must have a `.when()` condition before an action is set")]
    MissingCondition { rule: String },

    #[error("invalid time window format: {0}")]
    InvalidTimeWindow(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown classifier: {0}")]
    UnknownClassifier(String),

    #[error("invalid policy file {path:?}: {reason}")]
    PolicyFile { path: PathBuf, reason: String },

    #[error("Tool blocked by policy: {}", message.as_deref().unwrap_or("no reason given"))]
    Blocked {
        rule: Option<String>,
        message: Option<String>,
    },
}

pub type Result<T, E = GuardrailError> = std::result::Result<T, E>;

/// Compile a regex, mapping failures to a configuration error
pub(crate) fn compile_pattern(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|source| GuardrailError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
