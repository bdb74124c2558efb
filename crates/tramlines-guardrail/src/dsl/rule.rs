//! Rules, policies and the fluent rule builder.

use serde::{Deserialize, Serialize};

use super::predicate::Condition;
use crate::error::{GuardrailError, Result};

/// What happens when a rule's condition holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Allow,
    Block,
}

/// A single immutable security rule
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    condition: Condition,
    action: Action,
    message: Option<String>,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        condition: Condition,
        action: Action,
        message: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            action,
            message,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Fluent builder: `rule(name).when(condition).block(message)` or `.allow()`
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    condition: Option<Condition>,
}

impl RuleBuilder {
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Finalize as a BLOCK rule
    pub fn block(self, message: impl Into<String>) -> Result<Rule> {
        let (name, condition) = self.finish()?;
        Ok(Rule::new(name, condition, Action::Block, Some(message.into())))
    }

    /// Finalize as an ALLOW rule; a match stops evaluation of later rules
    pub fn allow(self) -> Result<Rule> {
        let (name, condition) = self.finish()?;
        Ok(Rule::new(name, condition, Action::Allow, None))
    }

    fn finish(self) -> Result<(String, Condition)> {
        match self.condition {
            Some(condition) => Ok((self.name, condition)),
            None => Err(GuardrailError::MissingCondition { rule: self.name }),
        }
    }
}

pub fn rule(name: impl Into<String>) -> RuleBuilder {
    RuleBuilder {
        name: name.into(),
        condition: None,
    }
}

// ============================================================================
// Policy
// ============================================================================

/// An ordered list of rules evaluated as a pipeline
#[derive(Debug, Clone)]
pub struct Policy {
    pub name: String,
    pub description: Option<String>,
    pub rules: Vec<Rule>,
}

impl Policy {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            description: None,
            rules,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append another policy's rules after this one's
    pub fn extend(&mut self, other: Policy) {
        self.rules.extend(other.rules);
    }

    /// Concatenate rule lists in the given order. Returns `None` when no rules
    /// remain, in which case calls are tracked but never judged.
    pub fn combine(policies: impl IntoIterator<Item = Policy>) -> Option<Policy> {
        let mut names = Vec::new();
        let mut rules = Vec::new();
        for policy in policies {
            names.push(policy.name);
            rules.extend(policy.rules);
        }
        if rules.is_empty() {
            return None;
        }
        let description = format!("A combination of: {}", names.join(", "));
        Some(Policy::new("Combined Guardrail Policy", rules).with_description(description))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::predicate::{always, never};

    #[test]
    fn test_block_rule() {
        let r = rule("no-deletes").when(always()).block("nope").unwrap();
        assert_eq!(r.name(), "no-deletes");
        assert_eq!(r.action(), Action::Block);
        assert_eq!(r.message(), Some("nope"));
    }

    #[test]
    fn test_allow_rule_has_no_message() {
        let r = rule("reads").when(always()).allow().unwrap();
        assert_eq!(r.action(), Action::Allow);
        assert!(r.message().is_none());
    }

    #[test]
    fn test_terminal_without_when_is_error() {
        let err = rule("broken").block("x").unwrap_err();
        assert!(matches!(err, GuardrailError::MissingCondition { rule: ref name } if name == "broken"));
        assert!(rule("broken").allow().is_err());
    }

    #[test]
    fn test_later_when_replaces_earlier() {
        let r = rule("r").when(always()).when(never()).allow().unwrap();
        assert_eq!(r.condition().label(), "never");
    }

    #[test]
    fn test_combine_preserves_order() {
        let a = Policy::new("a", vec![rule("a1").when(always()).block("a").unwrap()]);
        let b = Policy::new(
            "b",
            vec![
                rule("b1").when(always()).allow().unwrap(),
                rule("b2").when(never()).block("b").unwrap(),
            ],
        );
        let combined = Policy::combine([a, b]).unwrap();
        let names: Vec<&str> = combined.rules.iter().map(Rule::name).collect();
        assert_eq!(names, ["a1", "b1", "b2"]);
        assert_eq!(combined.name, "Combined Guardrail Policy");
        assert_eq!(combined.description.as_deref(), Some("A combination of: a, b"));
    }

    #[test]
    fn test_combine_without_rules_is_none() {
        assert!(Policy::combine([Policy::new("empty", vec![])]).is_none());
        assert!(Policy::combine(Vec::new()).is_none());
    }
}
