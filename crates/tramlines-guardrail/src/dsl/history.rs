//! Queries over a session's call history.

use std::sync::Arc;

use chrono::{Duration, Utc};
use regex::Regex;

use super::predicate::{Condition, Predicate};
use super::value::{StringValueBuilder, ValueBuilder};
use crate::call::{CallHistory, ToolCall};
use crate::error::{compile_pattern, GuardrailError, Result};

/// Parse a window token such as `10s`, `30m`, `1h` or `7d` (unit is case-insensitive)
pub fn parse_time_window(window: &str) -> Result<Duration> {
    let invalid = || GuardrailError::InvalidTimeWindow(window.to_string());

    let token = window.to_ascii_lowercase();
    let unit = token.chars().last().ok_or_else(invalid)?;
    let digits = &token[..token.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: i64 = digits.parse().map_err(|_| invalid())?;

    let duration = match unit {
        's' => Duration::try_seconds(value),
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Name pattern plus optional where-condition shared by all query terminals
#[derive(Clone)]
struct Selector {
    pattern: Regex,
    condition: Option<Condition>,
}

impl Selector {
    /// `condition` is evaluated against the candidate entry and the full history
    fn accepts(&self, candidate: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        if !self.pattern.is_match(&candidate.name) {
            return Ok(false);
        }
        match &self.condition {
            Some(condition) => condition.evaluate(candidate, history),
            None => Ok(true),
        }
    }

    fn describe(&self) -> String {
        match &self.condition {
            Some(condition) => format!(
                "history[/{}/ where {}]",
                self.pattern.as_str(),
                condition.label()
            ),
            None => format!("history[/{}/]", self.pattern.as_str()),
        }
    }
}

// ============================================================================
// HistoryQuery
// ============================================================================

/// A selection over the session history, started by `history.select(pattern)`
#[derive(Clone)]
pub struct HistoryQuery {
    selector: Selector,
}

impl HistoryQuery {
    /// Tool names are matched by regex search anywhere in the name
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self::from_regex(compile_pattern(pattern)?))
    }

    pub fn from_regex(pattern: Regex) -> Self {
        Self {
            selector: Selector {
                pattern,
                condition: None,
            },
        }
    }

    /// Narrow the selection to entries satisfying `condition(candidate, history)`
    pub fn where_(mut self, condition: Condition) -> Self {
        self.selector.condition = Some(condition);
        self
    }

    /// True if at least one entry matches
    pub fn exists(&self) -> Condition {
        let label = format!("exists {}", self.selector.describe());
        Condition::new(
            Exists {
                selector: self.selector.clone(),
            },
            label,
        )
    }

    /// Number of matching entries across the whole retained history
    pub fn count(&self) -> ValueBuilder<usize> {
        self.counter(None)
    }

    /// Number of matching entries whose timestamp lies within `[now - window, now]`.
    /// Entries without a timestamp are skipped. A malformed token is a
    /// configuration error.
    pub fn count_within(&self, window: &str) -> Result<ValueBuilder<usize>> {
        Ok(self.counter(Some(parse_time_window(window)?)))
    }

    fn counter(&self, window: Option<Duration>) -> ValueBuilder<usize> {
        let selector = self.selector.clone();
        let label = match window {
            Some(w) => format!("count {} within {}s", selector.describe(), w.num_seconds()),
            None => format!("count {}", selector.describe()),
        };
        ValueBuilder::try_new(label, move |_call: &ToolCall, history: &CallHistory| {
            let now = Utc::now();
            let cutoff = match window {
                Some(w) => Some(now.checked_sub_signed(w).ok_or_else(|| {
                    anyhow::anyhow!(
                        "time window of {}s reaches past the earliest representable time",
                        w.num_seconds()
                    )
                })?),
                None => None,
            };
            let mut count = 0usize;
            for past in history.iter() {
                if let Some(cutoff) = cutoff {
                    match past.timestamp {
                        Some(ts) if ts >= cutoff && ts <= now => {}
                        _ => continue,
                    }
                }
                if selector.accepts(past, history)? {
                    count += 1;
                }
            }
            Ok(Some(count))
        })
    }

    /// Chronologically earliest matching entry
    pub fn first(&self) -> HistoricalCall {
        HistoricalCall {
            selector: Arc::new(self.selector.clone()),
            newest_first: false,
        }
    }

    /// Most recent matching entry
    pub fn last(&self) -> HistoricalCall {
        HistoricalCall {
            selector: Arc::new(self.selector.clone()),
            newest_first: true,
        }
    }
}

struct Exists {
    selector: Selector,
}

impl Predicate for Exists {
    fn evaluate(&self, _call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        for past in history.iter() {
            if self.selector.accepts(past, history)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// HistoricalCall
// ============================================================================

/// Accessors for the first or last matching entry, located at evaluation time
#[derive(Clone)]
pub struct HistoricalCall {
    selector: Arc<Selector>,
    newest_first: bool,
}

impl HistoricalCall {
    fn find<'h>(
        selector: &Selector,
        newest_first: bool,
        history: &'h CallHistory,
    ) -> anyhow::Result<Option<&'h ToolCall>> {
        let candidates: Box<dyn Iterator<Item = &'h ToolCall> + 'h> = if newest_first {
            Box::new(history.iter().rev())
        } else {
            Box::new(history.iter())
        };
        for candidate in candidates {
            if selector.accepts(candidate, history)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        let which = if self.newest_first { "last" } else { "first" };
        format!("{} {}", which, self.selector.describe())
    }

    pub fn name(&self) -> StringValueBuilder {
        let selector = self.selector.clone();
        let newest_first = self.newest_first;
        ValueBuilder::try_new(
            format!("{}.name", self.describe()),
            move |_call: &ToolCall, history: &CallHistory| {
                Ok(Self::find(&selector, newest_first, history)?.map(|c| c.name.clone()))
            },
        )
    }

    /// Argument of the located entry as text; absent when missing or null
    pub fn arg(&self, key: &str) -> StringValueBuilder {
        let selector = self.selector.clone();
        let newest_first = self.newest_first;
        let key = key.to_string();
        ValueBuilder::try_new(
            format!("{}.arg({})", self.describe(), key),
            move |_call: &ToolCall, history: &CallHistory| {
                Ok(Self::find(&selector, newest_first, history)?
                    .and_then(|c| c.arg_text(&key)))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::predicate::custom;
    use serde_json::json;

    fn at(name: &str, args: serde_json::Value, minutes_ago: i64) -> ToolCall {
        ToolCall::from_json(name, args)
            .with_timestamp(Some(Utc::now() - Duration::minutes(minutes_ago)))
    }

    fn sample() -> CallHistory {
        CallHistory::from_calls(
            [
                at("read_file", json!({"user": "alice"}), 120),
                at("write_file", json!({"user": "bob"}), 30),
                at("read_file", json!({"user": "bob"}), 5),
                ToolCall::from_json("read_file", json!({"user": "carol"})).with_timestamp(None),
                at("write_file", json!({"user": "alice"}), 1),
            ],
            10,
        )
    }

    fn check(condition: &Condition, history: &CallHistory) -> bool {
        condition.evaluate(history.last().unwrap(), history).unwrap()
    }

    fn user_is(name: &'static str) -> Condition {
        custom(move |call, _| Ok(call.arg_str("user") == Some(name)))
    }

    #[test]
    fn test_parse_time_window_units() {
        assert_eq!(parse_time_window("10s").unwrap(), Duration::seconds(10));
        assert_eq!(parse_time_window("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_time_window("1H").unwrap(), Duration::hours(1));
        assert_eq!(parse_time_window("2d").unwrap(), Duration::days(2));
    }

    #[test]
    fn test_parse_time_window_rejects_garbage() {
        for bad in ["", "h", "10", "1w", "-1h", "1.5h", "ten m", "1h "] {
            assert!(
                matches!(parse_time_window(bad), Err(GuardrailError::InvalidTimeWindow(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_exists() {
        let history = sample();
        assert!(check(&HistoryQuery::new("read").unwrap().exists(), &history));
        assert!(!check(&HistoryQuery::new("delete").unwrap().exists(), &history));
    }

    #[test]
    fn test_exists_with_where() {
        let history = sample();
        let query = HistoryQuery::new("write_file").unwrap();
        assert!(check(&query.clone().where_(user_is("bob")).exists(), &history));
        assert!(!check(&query.where_(user_is("carol")).exists(), &history));
    }

    #[test]
    fn test_count_all_and_filtered() {
        let history = sample();
        let reads = HistoryQuery::new("read_file").unwrap();
        assert!(check(&reads.count().equals(3usize), &history));
        assert!(check(&reads.where_(user_is("bob")).count().equals(1usize), &history));
    }

    #[test]
    fn test_count_within_excludes_old_and_untimestamped() {
        let history = sample();
        let reads = HistoryQuery::new("read_file").unwrap();
        let within = reads.count_within("1h").unwrap();
        assert_eq!(within.extract(history.last().unwrap(), &history).unwrap(), Some(1));

        let any = HistoryQuery::new("_file").unwrap().count_within("1H").unwrap();
        assert_eq!(any.extract(history.last().unwrap(), &history).unwrap(), Some(3));
    }

    #[test]
    fn test_count_within_oversized_window_errors() {
        let history = sample();
        let within = HistoryQuery::new("read_file").unwrap().count_within("100000000d").unwrap();
        assert!(within.extract(history.last().unwrap(), &history).is_err());
    }

    #[test]
    fn test_count_within_invalid_window() {
        let reads = HistoryQuery::new("read_file").unwrap();
        assert!(reads.count_within("soon").is_err());
    }

    #[test]
    fn test_first_and_last() {
        let history = sample();
        let call = history.last().unwrap();
        let reads = HistoryQuery::new("read").unwrap();
        assert_eq!(reads.first().arg("user").extract(call, &history).unwrap().as_deref(), Some("alice"));
        assert_eq!(reads.last().arg("user").extract(call, &history).unwrap().as_deref(), Some("carol"));
        assert_eq!(
            HistoryQuery::new("file").unwrap().last().name().extract(call, &history).unwrap().as_deref(),
            Some("write_file")
        );
    }

    #[test]
    fn test_first_with_where() {
        let history = sample();
        let query = HistoryQuery::new("file").unwrap().where_(user_is("bob"));
        assert!(check(&query.first().name().equals("write_file"), &history));
        assert!(check(&query.last().name().equals("read_file"), &history));
    }

    #[test]
    fn test_no_match_yields_false_not_error() {
        let history = sample();
        let missing = HistoryQuery::new("delete").unwrap().last();
        assert!(!check(&missing.name().equals("delete"), &history));
        assert!(!check(&missing.arg("user").not_equals("x"), &history));
    }

    #[test]
    fn test_invalid_name_pattern() {
        assert!(matches!(
            HistoryQuery::new("[unclosed"),
            Err(GuardrailError::InvalidPattern { .. })
        ));
    }
}
