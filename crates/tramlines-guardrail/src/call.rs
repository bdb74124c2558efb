use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default bound for a history constructed without explicit configuration.
pub const DEFAULT_MAX_CALLS: usize = 100;

// ============================================================================
// ToolCall
// ============================================================================

/// Final status of a tool call, owned by whoever dispatches the call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallStatus {
    #[default]
    Allow,
    Block,
}

/// One recorded tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Set at creation; `None` only for calls replayed from files without one
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: CallStatus,
    /// Milliseconds spent executing the underlying tool
    #[serde(default)]
    pub execution_duration: Option<f64>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            arguments,
            timestamp: Some(Utc::now()),
            status: CallStatus::Allow,
            execution_duration: None,
        }
    }

    /// Build a call from a JSON value; anything other than an object yields no arguments
    pub fn from_json(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, arguments)
    }

    /// Override the creation timestamp (replayed or synthetic calls)
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }

    /// String-typed argument; `None` when missing or of another JSON type
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// Argument rendered as text: strings as-is, anything else as its JSON text.
    /// `None` when missing or null.
    pub fn arg_text(&self, key: &str) -> Option<String> {
        match self.arguments.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ============================================================================
// CallHistory
// ============================================================================

/// Bounded, chronologically ordered log of calls for one session.
/// Once `max_calls` is exceeded the oldest entries are dropped.
#[derive(Debug, Clone)]
pub struct CallHistory {
    calls: VecDeque<ToolCall>,
    max_calls: usize,
}

impl CallHistory {
    pub fn new(max_calls: usize) -> Self {
        Self {
            calls: VecDeque::new(),
            max_calls: max_calls.max(1),
        }
    }

    /// Build a history from calls in arrival order, keeping the newest `max_calls`
    pub fn from_calls(calls: impl IntoIterator<Item = ToolCall>, max_calls: usize) -> Self {
        let mut history = Self::new(max_calls);
        for call in calls {
            history.add_call(call);
        }
        history
    }

    pub fn add_call(&mut self, call: ToolCall) {
        self.calls.push_back(call);
        while self.calls.len() > self.max_calls {
            self.calls.pop_front();
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ToolCall> {
        self.calls.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ToolCall> {
        self.calls.get(index)
    }

    pub fn first(&self) -> Option<&ToolCall> {
        self.calls.front()
    }

    /// The call under judgment during evaluation
    pub fn last(&self) -> Option<&ToolCall> {
        self.calls.back()
    }

    /// Locate a recorded call by id so its status/duration can be filled in later.
    /// Returns `None` if the call has since been evicted.
    pub fn find_mut(&mut self, id: Uuid) -> Option<&mut ToolCall> {
        self.calls.iter_mut().rev().find(|c| c.id == id)
    }
}

impl Default for CallHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS)
    }
}
