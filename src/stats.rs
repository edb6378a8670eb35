//! Aggregate pool statistics.
//!
//! Counters are mutated only inside the dispatcher's event handling, so
//! updates never race with each other. Callers receive cloned snapshots.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide aggregate over the pool's lifetime.
///
/// `completed_tasks` and `failed_tasks` count terminal task outcomes;
/// the `*_attempts` counters count individual dispatches, so a task that
/// times out once and then succeeds contributes one completion and one
/// failed attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Tasks that reached a terminal success
    pub completed_tasks: u64,
    /// Tasks that exhausted their retry budget
    pub failed_tasks: u64,
    /// Dispatch attempts started
    pub total_attempts: u64,
    /// Attempts that failed or timed out, even when a later retry succeeded
    pub failed_attempts: u64,
    /// Subset of failed attempts that were timeouts
    pub timed_out_attempts: u64,
    /// Workers replaced after an attempt timeout
    pub worker_restarts: u64,
    /// Workers currently alive
    pub active_workers: usize,
    /// Tasks waiting in the pending queue
    pub queued_tasks: usize,
    /// Attempts currently running on a worker
    pub running_tasks: usize,
    /// Moving average of successful attempt durations
    pub avg_execution_time: Option<Duration>,
}

impl PoolStats {
    /// Per-attempt failure frequency as a ratio over all attempts.
    /// Zero when nothing has been dispatched yet.
    pub fn error_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.failed_attempts as f64 / self.total_attempts as f64
        }
    }

    pub(crate) fn record_execution_time(&mut self, duration: Duration) {
        // Simple moving average, same scheme for every sample.
        self.avg_execution_time = Some(match self.avg_execution_time {
            Some(avg) => Duration::from_nanos(
                ((avg.as_nanos() + duration.as_nanos()) / 2) as u64,
            ),
            None => duration,
        });
    }
}
