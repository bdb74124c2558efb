//! Predicate trait and boolean combinators.

use std::fmt;
use std::sync::Arc;

use crate::call::{CallHistory, ToolCall};

/// A boolean function of the call under judgment and the session history.
///
/// Implementations must be free of side effects on their inputs. An `Err` is
/// only expected from escape-hatch predicates (custom logic, classifiers); the
/// evaluator treats it as "rule did not match".
pub trait Predicate: Send + Sync {
    fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool>;
}

/// Cheaply cloneable handle to a predicate tree
#[derive(Clone)]
pub struct Condition {
    inner: Arc<dyn Predicate>,
    label: Arc<str>,
}

impl Condition {
    pub fn new(predicate: impl Predicate + 'static, label: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(predicate),
            label: label.into(),
        }
    }

    pub fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        self.inner.evaluate(call, history)
    }

    /// Human-readable shape of the tree, for logs and `validate` output
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn and(self, other: Condition) -> Condition {
        and(self, other)
    }

    pub fn or(self, other: Condition) -> Condition {
        or(self, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Condition {
        not(self)
    }
}

impl Predicate for Condition {
    fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        self.inner.evaluate(call, history)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.label).finish()
    }
}

// ============================================================================
// Combinators
// ============================================================================

struct And(Condition, Condition);

impl Predicate for And {
    fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        // Right side must not run when the left is false
        Ok(self.0.evaluate(call, history)? && self.1.evaluate(call, history)?)
    }
}

struct Or(Condition, Condition);

impl Predicate for Or {
    fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        Ok(self.0.evaluate(call, history)? || self.1.evaluate(call, history)?)
    }
}

struct Not(Condition);

impl Predicate for Not {
    fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        Ok(!self.0.evaluate(call, history)?)
    }
}

pub fn and(left: Condition, right: Condition) -> Condition {
    let label = format!("({} AND {})", left.label(), right.label());
    Condition::new(And(left, right), label)
}

pub fn or(left: Condition, right: Condition) -> Condition {
    let label = format!("({} OR {})", left.label(), right.label());
    Condition::new(Or(left, right), label)
}

pub fn not(inner: Condition) -> Condition {
    let label = format!("NOT {}", inner.label());
    Condition::new(Not(inner), label)
}

/// Matches every call
pub fn always() -> Condition {
    constant(true)
}

/// Matches no call
pub fn never() -> Condition {
    constant(false)
}

struct Constant(bool);

impl Predicate for Constant {
    fn evaluate(&self, _call: &ToolCall, _history: &CallHistory) -> anyhow::Result<bool> {
        Ok(self.0)
    }
}

fn constant(value: bool) -> Condition {
    Condition::new(Constant(value), if value { "always" } else { "never" })
}

// ============================================================================
// Custom
// ============================================================================

struct Custom<F>(F);

impl<F> Predicate for Custom<F>
where
    F: Fn(&ToolCall, &CallHistory) -> anyhow::Result<bool> + Send + Sync,
{
    fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        (self.0)(call, history)
    }
}

/// Escape hatch for logic the declarative builders cannot express.
/// Errors returned by `func` are not swallowed here; they reach the evaluator's
/// per-rule boundary.
pub fn custom<F>(func: F) -> Condition
where
    F: Fn(&ToolCall, &CallHistory) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    Condition::new(Custom(func), "custom")
}
