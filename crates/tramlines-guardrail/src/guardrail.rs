//! Transport-independent interception of tool calls.

use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::call::{CallStatus, ToolCall};
use crate::dsl::Policy;
use crate::error::{GuardrailError, Result};
use crate::evaluator::{evaluate, EvaluationResult};
use crate::session::{lock_history, SessionConfig, SessionManager, SessionStats};

#[derive(Debug, Clone, Default)]
pub struct GuardrailConfig {
    pub sessions: SessionConfig,
    /// Hidden from tool listings
    pub disabled_tools: Vec<String>,
}

/// Records every call per session and judges it against the active policy
/// before it reaches the underlying tool.
pub struct Guardrail {
    policy: Option<Policy>,
    sessions: SessionManager,
    disabled_tools: HashSet<String>,
}

impl Guardrail {
    /// With no policy, calls are tracked but never blocked
    pub fn new(policy: Option<Policy>, config: GuardrailConfig) -> Self {
        match &policy {
            Some(p) => info!(policy = %p.name, rules = p.len(), "Guardrail active"),
            None => info!("No policy loaded, calls will be tracked but not judged"),
        }
        Self {
            policy,
            sessions: SessionManager::new(&config.sessions),
            disabled_tools: config.disabled_tools.into_iter().collect(),
        }
    }

    pub fn policy(&self) -> Option<&Policy> {
        self.policy.as_ref()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Record the call in the session and judge it. A blocked call stays in
    /// history with status BLOCK.
    pub fn check(
        &self,
        session_id: &str,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<EvaluationResult> {
        self.admit(session_id, ToolCall::new(name, arguments))
    }

    /// Append and evaluate under a single lock acquisition
    fn admit(&self, session_id: &str, call: ToolCall) -> Result<EvaluationResult> {
        self.sessions.cleanup_stale_sessions();

        let shared = self.sessions.get_or_create(session_id);
        let mut history = lock_history(&shared);
        let id = call.id;
        debug!(session_id = %session_id, tool = %call.name, "Recording tool call");
        history.add_call(call);

        let Some(policy) = &self.policy else {
            return Ok(EvaluationResult::allow());
        };
        let result = evaluate(policy, &history)?;
        if result.is_blocked() {
            if let Some(recorded) = history.find_mut(id) {
                recorded.status = CallStatus::Block;
            }
        }
        Ok(result)
    }

    /// Run `next` only if the policy allows the call.
    ///
    /// A blocked call fails with `GuardrailError::Blocked` and `next` is never
    /// polled. Otherwise the recorded call gets the execution time and a final
    /// status: ALLOW if `next` succeeded, BLOCK if it failed.
    pub async fn call_tool<T, Fut>(
        &self,
        session_id: &str,
        name: &str,
        arguments: Map<String, Value>,
        next: Fut,
    ) -> anyhow::Result<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let call = ToolCall::new(name, arguments);
        let id = call.id;

        let decision = self.admit(session_id, call)?;
        if decision.is_blocked() {
            warn!(
                session_id = %session_id,
                tool = %name,
                rule = decision.violated_rule.as_deref().unwrap_or(""),
                "Rejecting blocked tool call"
            );
            return Err(GuardrailError::Blocked {
                rule: decision.violated_rule,
                message: decision.message,
            }
            .into());
        }

        let started = Instant::now();
        let outcome = next.await;
        let elapsed_ms = (started.elapsed().as_secs_f64() * 1_000_000.0).round() / 1000.0;

        let status = match &outcome {
            Ok(_) => CallStatus::Allow,
            Err(e) => {
                warn!(session_id = %session_id, tool = %name, error = %e, "Tool execution failed");
                CallStatus::Block
            }
        };
        self.record_outcome(session_id, id, status, elapsed_ms);
        outcome
    }

    fn record_outcome(&self, session_id: &str, id: Uuid, status: CallStatus, elapsed_ms: f64) {
        let Some(shared) = self.sessions.get(session_id) else {
            debug!(session_id = %session_id, "Session gone before tool finished");
            return;
        };
        let mut history = lock_history(&shared);
        match history.find_mut(id) {
            Some(recorded) => {
                recorded.status = status;
                recorded.execution_duration = Some(elapsed_ms);
            }
            None => debug!(session_id = %session_id, "Call evicted before tool finished"),
        }
    }

    /// Drop disabled tools from a listing
    pub fn visible_tools<T, I>(&self, tools: I) -> Vec<T>
    where
        T: AsRef<str>,
        I: IntoIterator<Item = T>,
    {
        tools
            .into_iter()
            .filter(|t| !self.disabled_tools.contains(t.as_ref()))
            .collect()
    }

    pub fn session_stats(&self) -> SessionStats {
        self.sessions.stats()
    }
}
