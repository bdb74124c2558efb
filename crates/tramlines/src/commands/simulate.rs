use crate::commands::load_active_policy;
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;
use tramlines_guardrail::testing::load_calls;
use tramlines_guardrail::{evaluate, CallHistory, CallStatus, Policy, ToolCall};

/// Judge each call in turn against the history before it, the way a live
/// session would. Blocked calls stay in history marked BLOCK.
pub fn replay(policy: &Policy, calls: Vec<ToolCall>, max_calls: usize) -> Result<Vec<Value>> {
    let mut history = CallHistory::new(max_calls);
    let mut decisions = Vec::with_capacity(calls.len());

    for (step, call) in calls.into_iter().enumerate() {
        let id = call.id;
        let tool = call.name.clone();
        history.add_call(call);

        let result = evaluate(policy, &history)?;
        if result.is_blocked() {
            if let Some(recorded) = history.find_mut(id) {
                recorded.status = CallStatus::Block;
            }
        }

        let mut decision = json!({ "step": step, "tool": tool });
        if let (Value::Object(out), Value::Object(fields)) =
            (&mut decision, serde_json::to_value(&result)?)
        {
            out.extend(fields);
        }
        decisions.push(decision);
    }
    Ok(decisions)
}

pub fn execute(
    calls_file: &Path,
    cli_paths: &[PathBuf],
    fail_on_block: bool,
    config: &Config,
) -> Result<()> {
    let policy = load_active_policy(cli_paths, config)?
        .context("No policy rules to simulate; pass --policy or list policies in the config")?;
    let calls = load_calls(calls_file)?;
    info!(calls = calls.len(), policy = %policy.name, "Replaying recorded calls");

    let decisions = replay(&policy, calls, config.sessions.max_calls_per_session)?;
    let blocked = decisions
        .iter()
        .filter(|d| d["action"] == "BLOCK")
        .count();
    for decision in &decisions {
        println!("{}", decision);
    }

    if fail_on_block && blocked > 0 {
        anyhow::bail!("{} of {} calls blocked", blocked, decisions.len());
    }
    Ok(())
}
