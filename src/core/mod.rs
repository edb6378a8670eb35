//! The pool facade and its internal machinery.
//!
//! [`TaskPool`] is the primary interface: it owns the dispatcher, the
//! workers, and the stats, and exposes submit/stats/terminate to
//! callers. Everything else in this module is plumbing behind it.

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::stats::PoolStats;
use crate::task::{TaskOutcome, TaskSpec};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::oneshot;

pub mod dispatch;
pub mod registry;
pub mod scale;
pub mod worker;

pub use registry::{FnHandler, HandlerRegistry, TaskHandler};
pub use scale::{FixedScale, LoadSnapshot, OnDemandScale, ScalePolicy};

use dispatch::Command;
use tokio::sync::mpsc;

/// A bounded pool of background workers with priority dispatch,
/// per-attempt timeouts, and retries.
///
/// The pool owns its workers and statistics exclusively; callers
/// interact only through [`submit`](TaskPool::submit),
/// [`stats`](TaskPool::stats), and [`terminate`](TaskPool::terminate).
///
/// # Examples
///
/// ```rust
/// use forgepool::prelude::*;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> PoolResult<()> {
/// let registry = HandlerRegistry::new()
///     .with(FnHandler::new("echo", |task| async move { Ok(task.payload) }));
/// let pool = TaskPool::new(PoolConfig::default(), registry)?;
///
/// let outcome = pool.submit(TaskSpec::new("echo", json!({"n": 1}))).await?;
/// assert!(outcome.success);
///
/// pool.terminate().await;
/// # Ok(())
/// # }
/// ```
pub struct TaskPool {
    command_tx: mpsc::UnboundedSender<Command>,
    stats: Arc<RwLock<PoolStats>>,
    closed: Arc<AtomicBool>,
}

impl TaskPool {
    /// Validate the configuration, then spawn the dispatcher and the
    /// initial workers. Must be called within a tokio runtime.
    pub fn new(config: PoolConfig, registry: HandlerRegistry) -> PoolResult<Self> {
        config
            .validate()
            .map_err(|errors| PoolError::config(errors.join("; ")))?;

        let stats = Arc::new(RwLock::new(PoolStats::default()));
        let command_tx =
            dispatch::spawn_dispatcher(config, Arc::new(registry), Arc::clone(&stats));

        Ok(Self {
            command_tx,
            stats,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Submit a task and wait for its terminal outcome.
    ///
    /// Suspends until the task succeeds or exhausts its retry budget; an
    /// exhausted-retry failure is an `Ok` outcome with `success = false`.
    /// `Err` is reserved for submissions the pool refuses: a closed
    /// pool, a duplicate id among pending tasks, or a zero timeout.
    pub async fn submit(&self, task: TaskSpec) -> PoolResult<TaskOutcome> {
        if task.timeout.is_zero() {
            return Err(PoolError::config("task timeout must be greater than zero"));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::PoolClosed);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Submit {
                task,
                reply: reply_tx,
            })
            .map_err(|_| PoolError::PoolClosed)?;

        reply_rx.await.map_err(|_| PoolError::PoolClosed)?
    }

    /// Snapshot of the pool's aggregate statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Terminate the pool: reject new submissions, settle every queued
    /// and in-flight task with a pool-closed error, and release all
    /// workers. Idempotent.
    pub async fn terminate(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Terminate { done: done_tx })
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Whether `terminate` has been called.
    pub fn is_terminated(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::task::TaskPriority;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn single_worker_config() -> PoolConfig {
        PoolConfig {
            workers: WorkerConfig::fixed(1),
            ..Default::default()
        }
    }

    fn echo_registry() -> HandlerRegistry {
        HandlerRegistry::new().with(FnHandler::new("echo", |task| async move {
            Ok(task.payload)
        }))
    }

    #[tokio::test]
    async fn test_submit_resolves_with_result() {
        let pool = TaskPool::new(single_worker_config(), echo_registry()).unwrap();

        let outcome = assert_ok!(
            pool.submit(TaskSpec::new("echo", json!({"n": 7})).with_id("t-1"))
                .await
        );

        assert!(outcome.success);
        assert_eq!(outcome.data, Some(json!({"n": 7})));
        assert!(outcome.error.is_none());
        assert!(outcome.memory_used > 0);

        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.total_attempts, 1);
        assert_eq!(stats.error_rate(), 0.0);

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_timeout_then_success_retries() {
        // Single worker, first invocation never responds, second
        // succeeds quickly, timeout 20ms, one retry.
        let calls = Arc::new(AtomicU32::new(0));
        let calls_handler = Arc::clone(&calls);
        let registry = HandlerRegistry::new().with(FnHandler::new("custom", move |_| {
            let calls = Arc::clone(&calls_handler);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok(json!({"ok": true}))
            }
        }));

        let pool = TaskPool::new(single_worker_config(), registry).unwrap();

        let task = TaskSpec::new("custom", json!({"payload": 42}))
            .with_id("retry-1")
            .with_priority(TaskPriority::Medium)
            .with_timeout(Duration::from_millis(20))
            .with_retries(1);

        let outcome = pool.submit(task).await.unwrap();
        assert!(outcome.success);

        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 1);
        assert!(stats.error_rate() > 0.0);
        assert_eq!(stats.timed_out_attempts, 1);
        assert_eq!(stats.worker_restarts, 1);
        assert_eq!(stats.total_attempts, 2);

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_retry_budget_bounds_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_handler = Arc::clone(&calls);
        let registry = HandlerRegistry::new().with(FnHandler::new("flaky", move |_| {
            let calls = Arc::clone(&calls_handler);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(crate::error::PoolError::task_failure("always fails"))
            }
        }));

        let pool = TaskPool::new(single_worker_config(), registry).unwrap();

        let task = TaskSpec::new("flaky", json!(null))
            .with_id("budget-1")
            .with_retries(2);
        let outcome = pool.submit(task).await.unwrap();

        // retries = 2 permits exactly 3 attempts.
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("always fails"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stats = pool.stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.failed_attempts, 3);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.completed_tasks, 0);

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_exhausted_timeouts_settle_once() {
        let registry = HandlerRegistry::new().with(FnHandler::new("hang", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!(null))
        }));
        let pool = TaskPool::new(single_worker_config(), registry).unwrap();

        let task = TaskSpec::new("hang", json!(null))
            .with_id("hang-1")
            .with_timeout(Duration::from_millis(10))
            .with_retries(1);
        let outcome = pool.submit(task).await.unwrap();
        assert!(!outcome.success);
        let expected = PoolError::Timeout {
            timeout: Duration::from_millis(10),
        };
        assert_eq!(outcome.error.as_deref(), Some(expected.to_string().as_str()));

        // No late reply may resurrect or double-count the task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 0);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.timed_out_attempts, 2);

        // The id is free again once the task is terminal.
        let resubmitted = pool
            .submit(
                TaskSpec::new("hang", json!(null))
                    .with_id("hang-1")
                    .with_timeout(Duration::from_millis(10)),
            )
            .await
            .unwrap();
        assert!(!resubmitted.success);

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_priority_order_on_single_worker() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_handler = Arc::clone(&order);
        let registry = HandlerRegistry::new().with(FnHandler::new("record", move |task| {
            let order = Arc::clone(&order_handler);
            async move {
                // Hold the worker briefly so later submissions queue up.
                tokio::time::sleep(Duration::from_millis(30)).await;
                order
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(task.id.clone());
                Ok(json!(null))
            }
        }));

        let pool = Arc::new(TaskPool::new(single_worker_config(), registry).unwrap());

        let submit = |id: &str, priority: TaskPriority| {
            let pool = Arc::clone(&pool);
            let task = TaskSpec::new("record", json!(null))
                .with_id(id)
                .with_priority(priority);
            tokio::spawn(async move { pool.submit(task).await })
        };

        // The gate occupies the worker; the rest queue simultaneously.
        let gate = submit("gate", TaskPriority::Medium);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let low = submit("low", TaskPriority::Low);
        let high = submit("high", TaskPriority::High);

        for handle in [gate, low, high] {
            handle.await.unwrap().unwrap();
        }

        let order = order.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(order, vec!["gate", "high", "low"]);

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_settles_in_flight_tasks() {
        let registry = HandlerRegistry::new().with(FnHandler::new("hang", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!(null))
        }));
        let pool = Arc::new(TaskPool::new(single_worker_config(), registry).unwrap());

        let mut handles = Vec::new();
        for i in 0..3 {
            let pool = Arc::clone(&pool);
            let task = TaskSpec::new("hang", json!(null)).with_id(format!("hang-{i}"));
            handles.push(tokio::spawn(async move { pool.submit(task).await }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.terminate().await;

        // Every outstanding future settles; none hang.
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(PoolError::PoolClosed)));
        }

        // New submissions fail fast.
        let result = pool.submit(TaskSpec::new("hang", json!(null))).await;
        assert!(matches!(result, Err(PoolError::PoolClosed)));
        assert!(pool.is_terminated());

        // Idempotent.
        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_while_pending() {
        let registry = HandlerRegistry::new().with(FnHandler::new("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!(null))
        }));
        let pool = Arc::new(TaskPool::new(single_worker_config(), registry).unwrap());

        let first = {
            let pool = Arc::clone(&pool);
            let task = TaskSpec::new("slow", json!(null)).with_id("dup");
            tokio::spawn(async move { pool.submit(task).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = pool
            .submit(TaskSpec::new("slow", json!(null)).with_id("dup"))
            .await;
        assert!(matches!(second, Err(PoolError::DuplicateTask { .. })));

        assert!(first.await.unwrap().unwrap().success);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_auto_scale_grows_to_cap() {
        let registry = HandlerRegistry::new().with(FnHandler::new("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok(json!(null))
        }));
        let config = PoolConfig {
            workers: WorkerConfig::scaling(1, 2),
            ..Default::default()
        };
        let pool = Arc::new(TaskPool::new(config, registry).unwrap());

        let mut handles = Vec::new();
        for i in 0..2 {
            let pool = Arc::clone(&pool);
            let task = TaskSpec::new("slow", json!(null)).with_id(format!("scale-{i}"));
            handles.push(tokio::spawn(async move { pool.submit(task).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().success);
        }

        // The second submission found no idle worker and grew the pool.
        assert_eq!(pool.stats().active_workers, 2);

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_fixed_pool_does_not_grow() {
        let registry = HandlerRegistry::new().with(FnHandler::new("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(json!(null))
        }));
        let pool = Arc::new(TaskPool::new(single_worker_config(), registry).unwrap());

        let mut handles = Vec::new();
        for i in 0..3 {
            let pool = Arc::clone(&pool);
            let task = TaskSpec::new("slow", json!(null)).with_id(format!("fixed-{i}"));
            handles.push(tokio::spawn(async move { pool.submit(task).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().success);
        }

        assert_eq!(pool.stats().active_workers, 1);
        assert_eq!(pool.stats().completed_tasks, 3);

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let pool = TaskPool::new(single_worker_config(), echo_registry()).unwrap();

        let task = TaskSpec::new("echo", json!(null)).with_timeout(Duration::ZERO);
        let result = pool.submit(task).await;
        assert!(matches!(result, Err(PoolError::ConfigError { .. })));

        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = PoolConfig {
            workers: WorkerConfig {
                min_workers: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = TaskPool::new(config, echo_registry());
        assert!(matches!(result, Err(PoolError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_unknown_kind_consumes_retries_then_fails() {
        let pool = TaskPool::new(single_worker_config(), echo_registry()).unwrap();

        let task = TaskSpec::new("nope", json!(null)).with_retries(1);
        let outcome = pool.submit(task).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("nope"));
        assert_eq!(pool.stats().total_attempts, 2);

        pool.terminate().await;
    }
}
