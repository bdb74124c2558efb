//! Declarative policy files (TOML or JSON) compiled into ordinary policies.
//!
//! A file describes one policy:
//!
//! ```toml
//! name = "Filesystem safety"
//!
//! [[rules]]
//! name = "no-delete-after-read"
//! action = "block"
//! message = "Deleting files after reading them is not allowed"
//!
//! [rules.when]
//! all = [
//!   { test = { value = "call_name", op = "equals", operand = "delete_file" } },
//!   { exists = { select = "^read_file$" } },
//! ]
//! ```
//!
//! Compilation only builds `Condition` values through the DSL. Nothing in a
//! file can loop or run code.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::classifier::{scan_arguments, ClassifierRegistry};
use crate::dsl::{
    always, and, call, history, never, not, or, rule, Condition, HistoryQuery, Policy, Rule,
    StringValueBuilder, ValueBuilder,
};
use crate::error::{GuardrailError, Result};

// ============================================================================
// File schema
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicySpec {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    name: String,
    action: RuleAction,
    #[serde(default)]
    message: Option<String>,
    when: ConditionSpec,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RuleAction {
    #[serde(alias = "BLOCK")]
    Block,
    #[serde(alias = "ALLOW")]
    Allow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ConditionSpec {
    All(Vec<ConditionSpec>),
    Any(Vec<ConditionSpec>),
    Not(Box<ConditionSpec>),
    /// `always = false` is the never-true predicate
    Always(bool),
    Test(TestSpec),
    Exists(QuerySpec),
    Count(CountSpec),
    /// Classifier name, looked up in the registry
    Classify(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestSpec {
    value: ValueKind,
    /// Argument name for `*_arg` values
    #[serde(default)]
    key: Option<String>,
    /// Tool-name pattern for `first_*` / `last_*` values
    #[serde(default)]
    select: Option<String>,
    #[serde(default, rename = "where")]
    where_: Option<Box<ConditionSpec>>,
    op: Op,
    operand: Operand,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuerySpec {
    select: String,
    #[serde(default, rename = "where")]
    where_: Option<Box<ConditionSpec>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CountSpec {
    select: String,
    #[serde(default, rename = "where")]
    where_: Option<Box<ConditionSpec>>,
    #[serde(default)]
    within: Option<String>,
    op: Op,
    operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ValueKind {
    CallName,
    CallArg,
    /// Same as `call_name`; reads naturally inside `where` clauses
    HistoryName,
    FirstName,
    LastName,
    FirstArg,
    LastArg,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Op {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Matches,
    IsIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Equals => "equals",
            Op::NotEquals => "not_equals",
            Op::GreaterThan => "greater_than",
            Op::LessThan => "less_than",
            Op::GreaterOrEqual => "greater_or_equal",
            Op::LessOrEqual => "less_or_equal",
            Op::Matches => "matches",
            Op::IsIn => "is_in",
            Op::Contains => "contains",
            Op::StartsWith => "starts_with",
            Op::EndsWith => "ends_with",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Operand {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

// ============================================================================
// Compilation
// ============================================================================

/// Source format of a policy file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Toml,
    Json,
}

impl PolicyFormat {
    /// Chosen by extension: `.json` is JSON, `.toml` is TOML
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            _ => Err(GuardrailError::PolicyFile {
                path: path.to_path_buf(),
                reason: "expected a .toml or .json extension".to_string(),
            }),
        }
    }
}

struct Compiler<'a> {
    path: &'a Path,
    registry: &'a ClassifierRegistry,
}

impl Compiler<'_> {
    fn invalid(&self, reason: impl Into<String>) -> GuardrailError {
        GuardrailError::PolicyFile {
            path: self.path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn policy(&self, spec: PolicySpec) -> Result<Policy> {
        let rules = spec
            .rules
            .into_iter()
            .map(|r| self.rule(r))
            .collect::<Result<Vec<Rule>>>()?;
        let mut policy = Policy::new(spec.name, rules);
        policy.description = spec.description;
        Ok(policy)
    }

    fn rule(&self, spec: RuleSpec) -> Result<Rule> {
        let condition = self.condition(&spec.when)?;
        let builder = rule(spec.name.as_str()).when(condition);
        match (spec.action, spec.message) {
            (RuleAction::Block, Some(message)) => builder.block(message),
            (RuleAction::Block, None) => Err(self.invalid(format!(
                "block rule '{}' needs a message",
                spec.name
            ))),
            (RuleAction::Allow, _) => builder.allow(),
        }
    }

    fn condition(&self, spec: &ConditionSpec) -> Result<Condition> {
        match spec {
            ConditionSpec::All(items) => self.fold(items, always, and),
            ConditionSpec::Any(items) => self.fold(items, never, or),
            ConditionSpec::Not(inner) => Ok(not(self.condition(inner)?)),
            ConditionSpec::Always(true) => Ok(always()),
            ConditionSpec::Always(false) => Ok(never()),
            ConditionSpec::Test(test) => self.test(test),
            ConditionSpec::Exists(query) => {
                Ok(self.query(&query.select, query.where_.as_deref())?.exists())
            }
            ConditionSpec::Count(count) => self.count(count),
            ConditionSpec::Classify(name) => Ok(scan_arguments(self.registry.get(name)?)),
        }
    }

    /// Left fold; an empty list yields `empty()`
    fn fold(
        &self,
        items: &[ConditionSpec],
        empty: fn() -> Condition,
        combine: fn(Condition, Condition) -> Condition,
    ) -> Result<Condition> {
        let mut items = items.iter();
        let Some(first) = items.next() else {
            return Ok(empty());
        };
        let mut acc = self.condition(first)?;
        for item in items {
            acc = combine(acc, self.condition(item)?);
        }
        Ok(acc)
    }

    fn query(&self, select: &str, where_: Option<&ConditionSpec>) -> Result<HistoryQuery> {
        let query = history().select(select)?;
        Ok(match where_ {
            Some(spec) => query.where_(self.condition(spec)?),
            None => query,
        })
    }

    fn count(&self, spec: &CountSpec) -> Result<Condition> {
        let query = self.query(&spec.select, spec.where_.as_deref())?;
        let counter = match &spec.within {
            Some(window) => query.count_within(window)?,
            None => query.count(),
        };
        let target = match spec.operand {
            Operand::Number(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
            _ => {
                return Err(self.invalid(format!(
                    "count operand must be a non-negative integer, got {:?}",
                    spec.operand
                )))
            }
        };
        self.compare(&counter, spec.op, target)
    }

    fn test(&self, spec: &TestSpec) -> Result<Condition> {
        let locates_history = matches!(
            spec.value,
            ValueKind::FirstName | ValueKind::LastName | ValueKind::FirstArg | ValueKind::LastArg
        );
        if !locates_history && (spec.select.is_some() || spec.where_.is_some()) {
            return Err(self.invalid("`select` and `where` apply only to first_* and last_* values"));
        }

        match spec.value {
            ValueKind::CallName | ValueKind::HistoryName => {
                self.string_op(&call().name(), spec.op, &spec.operand)
            }
            ValueKind::CallArg => {
                let key = self.key(spec)?;
                match &spec.operand {
                    Operand::Number(n) => self.compare(&call().arg_number(key), spec.op, *n),
                    Operand::Bool(b) => self.json_op(&call().arg_value(key), spec.op, Value::Bool(*b)),
                    operand => self.string_op(&call().arg(key), spec.op, operand),
                }
            }
            kind => {
                let select = spec
                    .select
                    .as_deref()
                    .ok_or_else(|| self.invalid("first_* and last_* values need `select`"))?;
                let query = self.query(select, spec.where_.as_deref())?;
                let located = match kind {
                    ValueKind::FirstName | ValueKind::FirstArg => query.first(),
                    _ => query.last(),
                };
                let value = match kind {
                    ValueKind::FirstArg | ValueKind::LastArg => located.arg(self.key(spec)?),
                    _ => located.name(),
                };
                self.string_op(&value, spec.op, &spec.operand)
            }
        }
    }

    fn key<'s>(&self, spec: &'s TestSpec) -> Result<&'s str> {
        spec.key
            .as_deref()
            .ok_or_else(|| self.invalid("argument values need `key`"))
    }

    fn compare<T>(&self, value: &ValueBuilder<T>, op: Op, target: T) -> Result<Condition>
    where
        T: PartialOrd + fmt::Debug + Send + Sync + 'static,
    {
        Ok(match op {
            Op::Equals => value.equals(target),
            Op::NotEquals => value.not_equals(target),
            Op::GreaterThan => value.greater_than(target),
            Op::LessThan => value.less_than(target),
            Op::GreaterOrEqual => value.greater_or_equal(target),
            Op::LessOrEqual => value.less_or_equal(target),
            other => {
                return Err(self.invalid(format!("operator `{}` needs a string operand", other)))
            }
        })
    }

    fn json_op(&self, value: &ValueBuilder<Value>, op: Op, target: Value) -> Result<Condition> {
        match op {
            Op::Equals => Ok(value.equals(target)),
            Op::NotEquals => Ok(value.not_equals(target)),
            other => Err(self.invalid(format!(
                "operator `{}` is not supported for boolean operands",
                other
            ))),
        }
    }

    fn string_op(&self, value: &StringValueBuilder, op: Op, operand: &Operand) -> Result<Condition> {
        match (op, operand) {
            (Op::Matches, Operand::Text(pattern)) => value.matches(pattern),
            (Op::IsIn | Op::Contains | Op::StartsWith | Op::EndsWith, Operand::Text(text)) => {
                Ok(self.string_set_op(value, op, vec![text.clone()]))
            }
            (Op::IsIn | Op::Contains | Op::StartsWith | Op::EndsWith, Operand::List(items)) => {
                Ok(self.string_set_op(value, op, items.clone()))
            }
            (_, Operand::Text(text)) => self.compare(value, op, text.clone()),
            _ => Err(self.invalid(format!(
                "operator `{}` does not accept operand {:?} for a string value",
                op, operand
            ))),
        }
    }

    fn string_set_op(&self, value: &StringValueBuilder, op: Op, items: Vec<String>) -> Condition {
        match op {
            Op::IsIn => value.is_in(items),
            Op::Contains => value.contains(items),
            Op::StartsWith => value.starts_with(items),
            _ => value.ends_with(items),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

fn compile(
    path: &Path,
    source: &str,
    format: PolicyFormat,
    registry: &ClassifierRegistry,
) -> Result<Policy> {
    let parse_error = |reason: String| GuardrailError::PolicyFile {
        path: path.to_path_buf(),
        reason,
    };
    let spec: PolicySpec = match format {
        PolicyFormat::Toml => toml::from_str(source).map_err(|e| parse_error(e.to_string()))?,
        PolicyFormat::Json => serde_json::from_str(source).map_err(|e| parse_error(e.to_string()))?,
    };
    Compiler { path, registry }.policy(spec)
}

/// Compile policy text that did not come from a file
pub fn parse_policy(
    source: &str,
    format: PolicyFormat,
    registry: &ClassifierRegistry,
) -> Result<Policy> {
    compile(Path::new("<inline>"), source, format, registry)
}

pub fn load_policy(path: impl AsRef<Path>, registry: &ClassifierRegistry) -> Result<Policy> {
    let path = path.as_ref();
    let format = PolicyFormat::from_path(path)?;
    let source = std::fs::read_to_string(path).map_err(|e| GuardrailError::PolicyFile {
        path: path.to_path_buf(),
        reason: format!("cannot read file: {}", e),
    })?;
    let policy = compile(path, &source, format, registry)?;
    info!(
        path = %path.display(),
        policy = %policy.name,
        rules = policy.len(),
        "Loaded policy file"
    );
    Ok(policy)
}

/// Load each file and combine them in order. `None` when no rules were loaded.
pub fn load_policies<I, P>(paths: I, registry: &ClassifierRegistry) -> Result<Option<Policy>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let policies = paths
        .into_iter()
        .map(|p| load_policy(p, registry))
        .collect::<Result<Vec<Policy>>>()?;
    Ok(Policy::combine(policies))
}
