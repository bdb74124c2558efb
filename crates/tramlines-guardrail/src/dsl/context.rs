//! Entry points policy authors build predicates from: `call()` and `history()`.

use regex::Regex;
use serde_json::Value;

use super::history::HistoryQuery;
use super::value::{StringValueBuilder, ValueBuilder};
use crate::call::{CallHistory, ToolCall};
use crate::error::Result;

/// Extractors over "the call" a predicate is evaluated against: the live call
/// at rule level, or the candidate entry inside a `where_` clause.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext;

impl CallContext {
    pub fn name(&self) -> StringValueBuilder {
        ValueBuilder::new("call.name", |call: &ToolCall, _: &CallHistory| {
            Some(call.name.clone())
        })
    }

    /// Argument as text (numbers and booleans by their JSON text); absent when missing or null
    pub fn arg(&self, key: &str) -> StringValueBuilder {
        let key = key.to_string();
        ValueBuilder::new(
            format!("call.arg({})", key),
            move |call: &ToolCall, _: &CallHistory| call.arg_text(&key),
        )
    }

    /// Numeric argument; absent unless the JSON value is a number
    pub fn arg_number(&self, key: &str) -> ValueBuilder<f64> {
        let key = key.to_string();
        ValueBuilder::new(
            format!("call.arg_number({})", key),
            move |call: &ToolCall, _: &CallHistory| call.arg(&key).and_then(Value::as_f64),
        )
    }

    /// Raw JSON argument, supporting equality tests only; JSON null counts as absent
    pub fn arg_value(&self, key: &str) -> ValueBuilder<Value> {
        let key = key.to_string();
        ValueBuilder::new(
            format!("call.arg_value({})", key),
            move |call: &ToolCall, _: &CallHistory| {
                call.arg(&key).filter(|v| !v.is_null()).cloned()
            },
        )
    }
}

/// Entry point for queries over the session history
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryContext;

impl HistoryContext {
    /// Accessors for the candidate entry inside `where_` clauses
    pub fn call(&self) -> CallContext {
        CallContext
    }

    /// Select entries whose tool name matches `pattern` anywhere.
    /// An invalid pattern is a configuration error.
    pub fn select(&self, pattern: &str) -> Result<HistoryQuery> {
        HistoryQuery::new(pattern)
    }

    pub fn select_regex(&self, pattern: Regex) -> HistoryQuery {
        HistoryQuery::from_regex(pattern)
    }
}

pub fn call() -> CallContext {
    CallContext
}

pub fn history() -> HistoryContext {
    HistoryContext
}
