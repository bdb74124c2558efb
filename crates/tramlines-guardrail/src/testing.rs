//! Helpers for exercising policies against scripted call sequences.

use std::path::Path;

use anyhow::Context;

use crate::call::{CallHistory, ToolCall};
use crate::dsl::Policy;
use crate::error::{GuardrailError, Result};
use crate::evaluator::{evaluate, EvaluationResult};

/// Replay `calls` one at a time into a fresh history that retains all of them.
/// Returns the first BLOCK, or the decision on the final call if none block.
/// No calls is an `EmptyHistory` error.
pub fn simulate_calls(
    policy: &Policy,
    calls: impl IntoIterator<Item = ToolCall>,
) -> Result<EvaluationResult> {
    let calls: Vec<ToolCall> = calls.into_iter().collect();
    let mut history = CallHistory::new(calls.len());
    let mut result = None;
    for call in calls {
        history.add_call(call);
        let decision = evaluate(policy, &history)?;
        if decision.is_blocked() {
            return Ok(decision);
        }
        result = Some(decision);
    }
    result.ok_or(GuardrailError::EmptyHistory)
}

#[track_caller]
pub fn assert_allowed(result: &EvaluationResult) {
    assert!(
        result.is_allowed(),
        "expected call to be allowed, but rule '{}' blocked it: {}",
        result.violated_rule.as_deref().unwrap_or("?"),
        result.message.as_deref().unwrap_or("")
    );
}

/// Panics unless blocked, and by `rule_name` when one is given
#[track_caller]
pub fn assert_blocked(result: &EvaluationResult, rule_name: Option<&str>) {
    assert!(result.is_blocked(), "expected call to be blocked, but it was allowed");
    if let Some(expected) = rule_name {
        assert_eq!(
            result.violated_rule.as_deref(),
            Some(expected),
            "call was blocked by the wrong rule"
        );
    }
}

/// Read a JSON array of `{name, arguments, timestamp?}` records
pub fn load_calls(path: impl AsRef<Path>) -> anyhow::Result<Vec<ToolCall>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read calls file: {:?}", path))?;
    let calls: Vec<ToolCall> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse calls file: {:?}", path))?;
    Ok(calls)
}
