//! Value extractors and the comparison predicates built from them.

use std::fmt::Debug;
use std::sync::Arc;

use regex::Regex;

use super::predicate::{Condition, Predicate};
use crate::call::{CallHistory, ToolCall};
use crate::error::{compile_pattern, Result};

type Extractor<T> = Arc<dyn Fn(&ToolCall, &CallHistory) -> anyhow::Result<Option<T>> + Send + Sync>;
type Test<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Wraps an extractor `(call, history) -> Option<T>`.
///
/// Not a predicate on its own: it becomes one through a comparison or one of
/// the string methods. `None` from the extractor means "absent", and every
/// predicate built on an absent value is false. Extractor errors (from a
/// custom where-clause, say) propagate to the rule boundary.
pub struct ValueBuilder<T> {
    extractor: Extractor<T>,
    label: String,
}

/// Value builder over string values, with the string-specific tests
pub type StringValueBuilder = ValueBuilder<String>;

impl<T> Clone for ValueBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            extractor: self.extractor.clone(),
            label: self.label.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> ValueBuilder<T> {
    pub fn new<F>(label: impl Into<String>, extractor: F) -> Self
    where
        F: Fn(&ToolCall, &CallHistory) -> Option<T> + Send + Sync + 'static,
    {
        Self::try_new(label, move |call: &ToolCall, history: &CallHistory| {
            Ok(extractor(call, history))
        })
    }

    /// Like `new`, for extractors that can fail
    pub fn try_new<F>(label: impl Into<String>, extractor: F) -> Self
    where
        F: Fn(&ToolCall, &CallHistory) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        Self {
            extractor: Arc::new(extractor),
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the extractor directly
    pub fn extract(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<Option<T>> {
        (self.extractor)(call, history)
    }

    /// Predicate that is true when the extracted value passes `test`
    pub fn satisfies<F>(&self, description: impl AsRef<str>, test: F) -> Condition
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let label = format!("{} {}", self.label, description.as_ref());
        Condition::new(
            ComparisonPredicate {
                extractor: self.extractor.clone(),
                test: Box::new(test),
            },
            label,
        )
    }
}

impl<T: PartialEq + Debug + Send + Sync + 'static> ValueBuilder<T> {
    pub fn equals(&self, target: impl Into<T>) -> Condition {
        let target = target.into();
        self.satisfies(format!("== {:?}", target), move |v| *v == target)
    }

    pub fn not_equals(&self, target: impl Into<T>) -> Condition {
        let target = target.into();
        self.satisfies(format!("!= {:?}", target), move |v| *v != target)
    }
}

impl<T: PartialOrd + Debug + Send + Sync + 'static> ValueBuilder<T> {
    pub fn greater_than(&self, target: impl Into<T>) -> Condition {
        let target = target.into();
        self.satisfies(format!("> {:?}", target), move |v| *v > target)
    }

    pub fn less_than(&self, target: impl Into<T>) -> Condition {
        let target = target.into();
        self.satisfies(format!("< {:?}", target), move |v| *v < target)
    }

    pub fn greater_or_equal(&self, target: impl Into<T>) -> Condition {
        let target = target.into();
        self.satisfies(format!(">= {:?}", target), move |v| *v >= target)
    }

    pub fn less_or_equal(&self, target: impl Into<T>) -> Condition {
        let target = target.into();
        self.satisfies(format!("<= {:?}", target), move |v| *v <= target)
    }
}

impl ValueBuilder<String> {
    /// Regex search anywhere in the value (not a full match).
    /// An invalid pattern is a configuration error.
    pub fn matches(&self, pattern: &str) -> Result<Condition> {
        Ok(self.matches_regex(compile_pattern(pattern)?))
    }

    pub fn matches_regex(&self, regex: Regex) -> Condition {
        self.satisfies(format!("matches /{}/", regex.as_str()), move |v| {
            regex.is_match(v)
        })
    }

    pub fn is_in<I, S>(&self, values: I) -> Condition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        self.satisfies(format!("in {:?}", values), move |v| values.contains(v))
    }

    /// True if any term occurs as a substring
    pub fn contains<I, S>(&self, terms: I) -> Condition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        self.satisfies(format!("contains any of {:?}", terms), move |v| {
            terms.iter().any(|t| v.contains(t.as_str()))
        })
    }

    pub fn starts_with<I, S>(&self, prefixes: I) -> Condition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        self.satisfies(format!("starts with any of {:?}", prefixes), move |v| {
            prefixes.iter().any(|p| v.starts_with(p.as_str()))
        })
    }

    pub fn ends_with<I, S>(&self, suffixes: I) -> Condition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let suffixes: Vec<String> = suffixes.into_iter().map(Into::into).collect();
        self.satisfies(format!("ends with any of {:?}", suffixes), move |v| {
            suffixes.iter().any(|s| v.ends_with(s.as_str()))
        })
    }
}

/// Captures an extractor and the test applied to its value
pub struct ComparisonPredicate<T> {
    extractor: Extractor<T>,
    test: Test<T>,
}

impl<T: Send + Sync> Predicate for ComparisonPredicate<T> {
    fn evaluate(&self, call: &ToolCall, history: &CallHistory) -> anyhow::Result<bool> {
        Ok(match (self.extractor)(call, history)? {
            Some(value) => (self.test)(&value),
            None => false,
        })
    }
}
