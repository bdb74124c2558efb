use crate::commands::load_active_policy;
use crate::config::Config;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tramlines_guardrail::Guardrail;

/// One line on stdin
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GuardRequest {
    Call {
        #[serde(default = "default_session")]
        session_id: String,
        name: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
    ListTools {
        tools: Vec<String>,
    },
    Stats {
        #[allow(dead_code)]
        stats: bool,
    },
}

fn default_session() -> String {
    "default".to_string()
}

/// Answer one request line. Malformed input yields an `error` object, never a panic.
fn handle_line(guard: &Guardrail, line: &str) -> Value {
    let request: GuardRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return json!({ "error": format!("invalid request: {}", e) }),
    };

    match request {
        GuardRequest::Call {
            session_id,
            name,
            arguments,
        } => match guard.check(&session_id, &name, arguments) {
            Ok(result) => {
                let mut response = json!({ "session_id": session_id, "tool": name });
                if let (Value::Object(out), Ok(Value::Object(fields))) =
                    (&mut response, serde_json::to_value(&result))
                {
                    out.extend(fields);
                }
                response
            }
            Err(e) => json!({ "error": e.to_string() }),
        },
        GuardRequest::ListTools { tools } => json!({ "tools": guard.visible_tools(tools) }),
        GuardRequest::Stats { .. } => json!({ "stats": guard.session_stats() }),
    }
}

pub async fn execute(cli_paths: &[PathBuf], config: &Config) -> Result<()> {
    let policy = load_active_policy(cli_paths, config)?;
    if policy.is_none() {
        warn!("No policy rules loaded; every call will be allowed");
    }
    let guard = Guardrail::new(policy, config.guardrail_config());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut handled = 0usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        println!("{}", handle_line(&guard, &line));
        handled += 1;
    }

    info!(requests = handled, "Input closed, guard stopping");
    Ok(())
}
