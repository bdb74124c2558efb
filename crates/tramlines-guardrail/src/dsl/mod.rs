//! Policy DSL: predicates, value builders, history queries and rules.
//!
//! ```ignore
//! let policy = Policy::new(
//!     "rate limits",
//!     vec![rule("rate")
//!         .when(history().select("api_call")?.count_within("1m")?.greater_than(2usize))
//!         .block("too many")?],
//! );
//! ```

pub mod context;
pub mod history;
pub mod predicate;
pub mod rule;
pub mod value;

pub use context::{call, history, CallContext, HistoryContext};
pub use history::{parse_time_window, HistoricalCall, HistoryQuery};
pub use predicate::{always, and, custom, never, not, or, Condition, Predicate};
pub use rule::{rule, Action, Policy, Rule, RuleBuilder};
pub use value::{ComparisonPredicate, StringValueBuilder, ValueBuilder};
