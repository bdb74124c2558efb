pub mod call;
pub mod classifier;
pub mod dsl;
pub mod error;
pub mod evaluator;
pub mod guardrail;
pub mod policies;
pub mod policy_file;
pub mod session;
pub mod testing;

pub use call::{CallHistory, CallStatus, ToolCall, DEFAULT_MAX_CALLS};
pub use classifier::{scan_arguments, Classifier, ClassifierRegistry, RegexClassifier};
pub use dsl::{
    always, and, call, custom, history, never, not, or, rule, Action, Condition, Policy,
    Predicate, Rule, RuleBuilder, StringValueBuilder, ValueBuilder,
};
pub use error::{GuardrailError, Result};
pub use evaluator::{evaluate, EvaluationResult};
pub use guardrail::{Guardrail, GuardrailConfig};
pub use policy_file::{load_policies, load_policy, parse_policy, PolicyFormat};
pub use session::{SessionConfig, SessionManager, SessionStats};

/// Initialize structured JSON logging on stderr, leaving stdout for decisions
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
