//! Reusable policy constructors built on the public DSL.

use std::collections::HashSet;
use std::sync::Arc;

use crate::call::ToolCall;
use crate::classifier::{scan_arguments, Classifier};
use crate::dsl::{custom, rule, Policy};
use crate::error::Result;

/// GitHub tools that act on an owner/repo pair
pub const GITHUB_REPO_TOOLS: &[&str] = &[
    "add_issue_comment",
    "add_pull_request_review_comment",
    "create_branch",
    "create_issue",
    "create_or_update_file",
    "create_pull_request",
    "create_pull_request_review",
    "delete_file",
    "fork_repository",
    "get_code_scanning_alert",
    "get_commit",
    "get_file_contents",
    "get_issue",
    "get_issue_comments",
    "get_pull_request",
    "get_pull_request_comments",
    "get_pull_request_files",
    "get_pull_request_reviews",
    "get_pull_request_status",
    "get_secret_scanning_alert",
    "get_tag",
    "list_branches",
    "list_code_scanning_alerts",
    "list_commits",
    "list_issues",
    "list_pull_requests",
    "list_secret_scanning_alerts",
    "list_tags",
    "merge_pull_request",
    "push_files",
    "request_copilot_review",
    "update_issue",
    "update_pull_request",
    "update_pull_request_branch",
];

/// Values of `keys` as non-empty strings, or `None` if any is missing
fn scope_of<'c>(call: &'c ToolCall, keys: &[String]) -> Option<Vec<&'c str>> {
    keys.iter()
        .map(|k| call.arg_str(k).filter(|v| !v.is_empty()))
        .collect()
}

/// Pin a session to the first scope (e.g. owner/repo) it touches.
///
/// A call carrying every one of `keys` is blocked when an earlier call to one
/// of `tools` in the same session used a different, fully specified scope.
/// Only earlier calls are filtered by `tools`. Calls that lack any of `keys`
/// never trigger the rule.
pub fn single_scope_per_session(
    policy_name: &str,
    rule_name: &str,
    tools: &[&str],
    keys: &[&str],
    message: &str,
) -> Result<Policy> {
    let tools: HashSet<String> = tools.iter().map(|t| t.to_string()).collect();
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

    let crosses_scope = custom(move |current, history| {
        let Some(scope) = scope_of(current, &keys) else {
            return Ok(false);
        };
        Ok(history
            .iter()
            .filter(|prev| tools.contains(&prev.name))
            .filter_map(|prev| scope_of(prev, &keys))
            .any(|prev_scope| prev_scope != scope))
    });

    Ok(Policy::new(
        policy_name,
        vec![rule(rule_name).when(crosses_scope).block(message)?],
    ))
}

pub fn github_single_repo() -> Result<Policy> {
    Ok(single_scope_per_session(
        "GitHub: Enforce Single Repository Per Session",
        "Block cross-repository GitHub operations",
        GITHUB_REPO_TOOLS,
        &["owner", "repo"],
        "Access denied: You may only interact with one GitHub repository per session.",
    )?
    .with_description(
        "Restricts tool access to one GitHub repository per session to prevent cross-repo attacks.",
    ))
}

/// Block any call whose arguments the classifier flags
pub fn block_classified_arguments(
    classifier: Arc<dyn Classifier>,
    message: &str,
) -> Result<Policy> {
    let policy_name = format!("Block {} in tool arguments", classifier.name());
    let rule_name = format!("Block tool calls containing {} in arguments", classifier.name());
    Ok(Policy::new(
        policy_name,
        vec![rule(rule_name).when(scan_arguments(classifier)).block(message)?],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RegexClassifier;
    use crate::testing::{assert_allowed, assert_blocked, simulate_calls};
    use serde_json::json;

    fn gh(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::from_json(name, args)
    }

    #[test]
    fn test_same_repo_allowed() {
        let policy = github_single_repo().unwrap();
        let result = simulate_calls(
            &policy,
            vec![
                gh("create_issue", json!({"owner": "a", "repo": "x"})),
                gh("get_issue", json!({"owner": "a", "repo": "x", "issue_number": 1})),
            ],
        )
        .unwrap();
        assert_allowed(&result);
    }

    #[test]
    fn test_second_repo_blocked() {
        let policy = github_single_repo().unwrap();
        let result = simulate_calls(
            &policy,
            vec![
                gh("create_issue", json!({"owner": "a", "repo": "x"})),
                gh("get_issue", json!({"owner": "a", "repo": "y"})),
            ],
        )
        .unwrap();
        assert_blocked(&result, Some("Block cross-repository GitHub operations"));
    }

    #[test]
    fn test_call_without_scope_never_triggers() {
        let policy = github_single_repo().unwrap();
        let result = simulate_calls(
            &policy,
            vec![
                gh("create_issue", json!({"owner": "a", "repo": "x"})),
                gh("list_issues", json!({"owner": "b"})),
                gh("search_repositories", json!({"query": "rust"})),
            ],
        )
        .unwrap();
        assert_allowed(&result);
    }

    #[test]
    fn test_unlisted_tool_checked_against_pinned_scope() {
        let policy = github_single_repo().unwrap();
        let result = simulate_calls(
            &policy,
            vec![
                gh("create_issue", json!({"owner": "a", "repo": "x"})),
                gh("search_code", json!({"owner": "b", "repo": "z"})),
            ],
        )
        .unwrap();
        assert_blocked(&result, Some("Block cross-repository GitHub operations"));
    }

    #[test]
    fn test_unlisted_earlier_call_does_not_pin_scope() {
        let policy = github_single_repo().unwrap();
        let result = simulate_calls(
            &policy,
            vec![
                gh("unrelated_tool", json!({"owner": "b", "repo": "z"})),
                gh("create_issue", json!({"owner": "a", "repo": "x"})),
            ],
        )
        .unwrap();
        assert_allowed(&result);
    }

    #[test]
    fn test_custom_scope_keys() {
        let policy = single_scope_per_session(
            "Heroku",
            "single-app",
            &["deploy_app", "get_app_info"],
            &["app"],
            "one app per session",
        )
        .unwrap();
        let result = simulate_calls(
            &policy,
            vec![
                gh("get_app_info", json!({"app": "web"})),
                gh("deploy_app", json!({"app": "worker"})),
            ],
        )
        .unwrap();
        assert_blocked(&result, Some("single-app"));
    }

    #[test]
    fn test_block_classified_arguments() {
        let policy =
            block_classified_arguments(Arc::new(RegexClassifier::pii().unwrap()), "PII detected").unwrap();
        assert_eq!(policy.name, "Block pii in tool arguments");

        let result = simulate_calls(
            &policy,
            vec![gh("send", json!({"data": {"user": {"contact": "call 555-123-4567"}}}))],
        )
        .unwrap();
        assert_blocked(&result, None);
        assert_eq!(result.message.as_deref(), Some("PII detected"));
    }
}
