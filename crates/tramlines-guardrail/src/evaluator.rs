//! Resolves a policy against a session history into a single decision.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::call::{CallHistory, ToolCall};
use crate::dsl::{Action, Policy, Rule};
use crate::error::{GuardrailError, Result};

/// Decision for one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violated_rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EvaluationResult {
    pub fn allow() -> Self {
        Self {
            action: Action::Allow,
            violated_rule: None,
            message: None,
        }
    }

    pub fn block(rule: &Rule) -> Self {
        Self {
            action: Action::Block,
            violated_rule: Some(rule.name().to_string()),
            message: rule.message().map(str::to_string),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }

    pub fn is_blocked(&self) -> bool {
        self.action == Action::Block
    }
}

/// Outcome of judging one rule
enum RuleOutcome {
    Matched,
    NotMatched,
    Failed(anyhow::Error),
}

/// The catch boundary around exactly one rule's condition
fn judge(rule: &Rule, call: &ToolCall, history: &CallHistory) -> RuleOutcome {
    match rule.condition().evaluate(call, history) {
        Ok(true) => RuleOutcome::Matched,
        Ok(false) => RuleOutcome::NotMatched,
        Err(e) => RuleOutcome::Failed(e),
    }
}

/// Evaluate `policy` against the newest call in `history`.
///
/// Rules run in list order and the first match decides: BLOCK returns the
/// rule's name and message, ALLOW stops evaluation. A rule whose condition
/// fails is logged and treated as not matching. With no match the call is
/// allowed. An empty history is a usage error.
pub fn evaluate(policy: &Policy, history: &CallHistory) -> Result<EvaluationResult> {
    let call = history.last().ok_or(GuardrailError::EmptyHistory)?;

    for rule in &policy.rules {
        match judge(rule, call, history) {
            RuleOutcome::Matched => match rule.action() {
                Action::Block => {
                    warn!(
                        tool = %call.name,
                        rule = rule.name(),
                        policy = %policy.name,
                        "Tool call blocked by rule"
                    );
                    return Ok(EvaluationResult::block(rule));
                }
                Action::Allow => {
                    debug!(tool = %call.name, rule = rule.name(), "Tool call allowed by rule");
                    return Ok(EvaluationResult::allow());
                }
            },
            RuleOutcome::NotMatched => continue,
            RuleOutcome::Failed(e) => {
                error!(
                    tool = %call.name,
                    rule = rule.name(),
                    error = %e,
                    "Error evaluating rule, treating as not matched"
                );
                continue;
            }
        }
    }

    Ok(EvaluationResult::allow())
}
