//! Per-session call histories with idle eviction.
//!
//! Each session's history sits behind its own `Mutex`. Callers lock it for the
//! whole append-then-evaluate step, which serializes concurrent calls within
//! one session while leaving other sessions untouched.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::call::{CallHistory, ToolCall};

/// Shared handle to one session's history
pub type SharedHistory = Arc<Mutex<CallHistory>>;

/// Session bookkeeping limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Calls retained per session before the oldest are dropped
    #[serde(default = "default_max_calls")]
    pub max_calls_per_session: usize,

    /// Idle period after which a session is evicted; also the minimum gap
    /// between cleanup passes. Values below one hour are raised to one.
    #[serde(default = "default_cleanup_hours")]
    pub cleanup_hours: u32,
}

fn default_max_calls() -> usize {
    30
}

fn default_cleanup_hours() -> u32 {
    24
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_calls_per_session: default_max_calls(),
            cleanup_hours: default_cleanup_hours(),
        }
    }
}

/// Snapshot of session usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub total_calls: usize,
    pub max_calls_per_session: usize,
}

/// Lock a history, recovering from a poisoned lock
pub fn lock_history(history: &SharedHistory) -> MutexGuard<'_, CallHistory> {
    history.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SessionManager {
    histories: DashMap<String, SharedHistory>,
    max_calls_per_session: usize,
    cleanup_interval: Duration,
    last_cleanup: Mutex<DateTime<Utc>>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            histories: DashMap::new(),
            max_calls_per_session: config.max_calls_per_session.max(1),
            cleanup_interval: Duration::hours(i64::from(config.cleanup_hours.max(1))),
            last_cleanup: Mutex::new(Utc::now()),
        }
    }

    /// Get the session's history, creating an empty one on first access
    pub fn get_or_create(&self, session_id: &str) -> SharedHistory {
        if let Some(existing) = self.histories.get(session_id) {
            return existing.clone();
        }
        self.histories
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %session_id, "Creating new call history");
                Arc::new(Mutex::new(CallHistory::new(self.max_calls_per_session)))
            })
            .clone()
    }

    /// Existing session only; never creates one
    pub fn get(&self, session_id: &str) -> Option<SharedHistory> {
        self.histories.get(session_id).map(|entry| entry.clone())
    }

    /// Append a call to the session's history
    pub fn add_call(&self, session_id: &str, call: ToolCall) {
        let history = self.get_or_create(session_id);
        lock_history(&history).add_call(call);
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.histories.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn max_calls_per_session(&self) -> usize {
        self.max_calls_per_session
    }

    /// Evict idle sessions, at most once per cleanup interval.
    /// Returns the number of sessions dropped.
    pub fn cleanup_stale_sessions(&self) -> usize {
        self.cleanup_stale_sessions_at(Utc::now())
    }

    /// `cleanup_stale_sessions` against an explicit clock
    pub fn cleanup_stale_sessions_at(&self, now: DateTime<Utc>) -> usize {
        {
            let mut last = self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner());
            if now - *last < self.cleanup_interval {
                return 0;
            }
            *last = now;
        }

        let cutoff = now - self.cleanup_interval;
        let before = self.histories.len();
        self.histories.retain(|_, history| {
            // A session in use right now is not idle
            let Ok(history) = history.try_lock() else {
                return true;
            };
            match history.last() {
                None => false,
                Some(call) => call.timestamp.is_some_and(|ts| ts >= cutoff),
            }
        });
        let removed = before.saturating_sub(self.histories.len());

        if removed > 0 {
            info!(removed, remaining = self.histories.len(), "Evicted stale sessions");
        }
        removed
    }

    pub fn stats(&self) -> SessionStats {
        let total_calls = self
            .histories
            .iter()
            .map(|entry| lock_history(entry.value()).len())
            .sum();
        SessionStats {
            active_sessions: self.histories.len(),
            total_calls,
            max_calls_per_session: self.max_calls_per_session,
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn manager(max_calls: usize) -> SessionManager {
        SessionManager::new(&SessionConfig {
            max_calls_per_session: max_calls,
            cleanup_hours: 24,
        })
    }

    fn call_at(name: &str, at: DateTime<Utc>) -> ToolCall {
        ToolCall::new(name, Map::new()).with_timestamp(Some(at))
    }

    #[test]
    fn test_get_or_create_returns_same_history() {
        let sessions = manager(10);
        let a = sessions.get_or_create("s1");
        lock_history(&a).add_call(ToolCall::new("x", Map::new()));
        let b = sessions.get_or_create("s1");
        assert_eq!(lock_history(&b).len(), 1);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_sessions_are_independent() {
        let sessions = manager(10);
        sessions.add_call("s1", ToolCall::new("a", Map::new()));
        sessions.add_call("s2", ToolCall::new("b", Map::new()));
        sessions.add_call("s2", ToolCall::new("c", Map::new()));
        assert_eq!(lock_history(&sessions.get_or_create("s1")).len(), 1);
        assert_eq!(lock_history(&sessions.get_or_create("s2")).len(), 2);
    }

    #[test]
    fn test_bounded_sliding_window() {
        let sessions = manager(3);
        for name in ["first", "second", "third", "fourth"] {
            sessions.add_call("s", ToolCall::new(name, Map::new()));
        }
        let history = sessions.get_or_create("s");
        let history = lock_history(&history);
        assert_eq!(history.len(), 3);
        assert_eq!(history.first().unwrap().name, "second");
    }

    #[test]
    fn test_cleanup_is_throttled() {
        let sessions = manager(10);
        sessions.get_or_create("empty");
        assert_eq!(sessions.cleanup_stale_sessions(), 0);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_zero_cleanup_hours_keeps_live_sessions() {
        let sessions = SessionManager::new(&SessionConfig {
            max_calls_per_session: 10,
            cleanup_hours: 0,
        });
        sessions.add_call("s", ToolCall::new("a", Map::new()));
        assert_eq!(sessions.cleanup_stale_sessions(), 0);
        assert_eq!(sessions.cleanup_stale_sessions_at(Utc::now() + Duration::minutes(30)), 0);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_cleanup_evicts_idle_and_empty_sessions() {
        let sessions = manager(10);
        let now = Utc::now() + Duration::hours(25);
        sessions.get_or_create("empty");
        sessions.add_call("idle", call_at("a", now - Duration::hours(30)));
        sessions.add_call("active", call_at("a", now - Duration::hours(30)));
        sessions.add_call("active", call_at("b", now - Duration::minutes(5)));

        assert_eq!(sessions.cleanup_stale_sessions_at(now), 2);
        assert_eq!(sessions.len(), 1);
        assert_eq!(lock_history(&sessions.get_or_create("active")).len(), 2);

        // Too soon for another pass
        sessions.get_or_create("new_empty");
        assert_eq!(sessions.cleanup_stale_sessions_at(now + Duration::hours(1)), 0);
    }

    #[test]
    fn test_cleanup_skips_locked_sessions() {
        let sessions = manager(10);
        let now = Utc::now() + Duration::hours(25);
        let busy = sessions.get_or_create("busy");
        let _guard = lock_history(&busy);
        assert_eq!(sessions.cleanup_stale_sessions_at(now), 0);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_stats() {
        let sessions = manager(7);
        sessions.add_call("s1", ToolCall::new("a", Map::new()));
        sessions.add_call("s2", ToolCall::new("b", Map::new()));
        sessions.add_call("s2", ToolCall::new("c", Map::new()));
        assert_eq!(
            sessions.stats(),
            SessionStats {
                active_sessions: 2,
                total_calls: 3,
                max_calls_per_session: 7,
            }
        );
        assert!(sessions.remove("s1"));
        assert!(!sessions.remove("s1"));
        assert!(sessions.get("s1").is_none());
        assert!(sessions.get("s2").is_some());
    }

    #[test]
    fn test_concurrent_sessions() {
        let sessions = Arc::new(manager(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sessions = sessions.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sessions.add_call(&format!("s{}", t % 4), ToolCall::new(format!("c{}", i), Map::new()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = sessions.stats();
        assert_eq!(stats.active_sessions, 4);
        assert_eq!(stats.total_calls, 400);
    }
}
