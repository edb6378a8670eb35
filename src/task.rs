//! Task types: submissions, priorities, and outcomes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for a task
pub type TaskId = String;

/// Priority tier used to order pending tasks.
///
/// Higher tiers are dispatched first when a worker frees up; within a
/// tier, submission order is preserved (FIFO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background work
    Low = 0,
    /// Default tier
    #[default]
    Medium = 1,
    /// Dispatched ahead of everything else
    High = 2,
}

impl TaskPriority {
    /// All tiers, highest first. Used by the pending queue to pick the
    /// next task when a worker becomes free.
    pub const DESCENDING: [TaskPriority; 3] =
        [TaskPriority::High, TaskPriority::Medium, TaskPriority::Low];

    /// Index of this tier into per-tier storage.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// A unit of work submitted to the pool.
///
/// The id correlates the submission with its outcome and must be unique
/// among tasks concurrently queued or in flight. `retries = N` permits at
/// most `N + 1` dispatch attempts before the task is reported as a
/// terminal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task identifier
    pub id: TaskId,
    /// Kind tag selecting the handler that executes this task
    pub kind: String,
    /// Opaque payload, meaningful only to the handler
    pub payload: serde_json::Value,
    /// Ordering hint among pending tasks
    pub priority: TaskPriority,
    /// Duration after which an in-flight attempt is considered failed
    pub timeout: Duration,
    /// Re-attempts permitted after a failed or timed-out attempt
    pub retries: u32,
}

impl TaskSpec {
    /// Create a task with a generated UUID id and default settings
    /// (medium priority, 30 second timeout, no retries).
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            payload,
            priority: TaskPriority::Medium,
            timeout: Duration::from_secs(30),
            retries: 0,
        }
    }

    /// Set an explicit task id.
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the priority tier.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Terminal outcome of a task, delivered to the submitter once no
/// further attempts will be made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Whether the task reached a terminal success
    pub success: bool,
    /// Result payload, present iff `success`
    pub data: Option<serde_json::Value>,
    /// Error description, present iff `!success`
    pub error: Option<String>,
    /// Execution time of the final attempt
    pub execution_time: Duration,
    /// Rough payload + result footprint of the final attempt, in bytes
    pub memory_used: u64,
}

impl TaskOutcome {
    pub(crate) fn succeeded(data: serde_json::Value, execution_time: Duration, memory_used: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time,
            memory_used,
        }
    }

    pub(crate) fn failed(error: String, execution_time: Duration, memory_used: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            execution_time,
            memory_used,
        }
    }
}

/// Correlation key for one dispatch attempt.
///
/// Worker replies and timeout events are matched on the attempt number,
/// not just the task id, so a late reply from a superseded attempt can
/// never be mistaken for the current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    /// Task this attempt belongs to
    pub task_id: TaskId,
    /// 1-based attempt number
    pub attempt: u32,
}
