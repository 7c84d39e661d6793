//! Query instrumentation hooks

use std::time::Duration;

use super::QueryState;
use crate::QueryError;

/// Receives lifecycle events of a query. Every method defaults to doing
/// nothing, so implementors override only what they need.
pub trait QueryObserver: Send + Sync {
    fn state_changed(&self, _token: &str, _from: QueryState, _to: QueryState) {}

    /// Bound counts after an estimate
    fn estimated(&self, _token: &str, _low: u64, _high: u64) {}

    /// Exact hit count after an evaluation
    fn evaluated(&self, _token: &str, _hits: u64, _elapsed: Duration) {}

    fn failed(&self, _token: &str, _error: &QueryError) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl QueryObserver for NoopObserver {}
