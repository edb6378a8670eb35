//! Worker actors.
//!
//! Each worker is an isolated execution unit that receives one job at a
//! time over its own channel and reports back over the shared reply
//! channel. The dispatcher never shares mutable state with a worker; a
//! worker's internal execution model is invisible to it.

use crate::core::registry::HandlerRegistry;
use crate::error::PoolError;
use crate::task::{AttemptKey, TaskSpec};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One dispatch attempt, sent to a worker.
#[derive(Debug)]
pub struct WorkerJob {
    /// Correlation key for this attempt
    pub key: AttemptKey,
    /// The task to execute
    pub task: TaskSpec,
}

/// What a single attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// Handler returned a value
    Completed(serde_json::Value),
    /// Handler returned an error or panicked
    Failed(String),
}

/// Reply from a worker to the dispatcher.
///
/// Carries the slot generation alongside the attempt key: a reply from a
/// worker that has since been replaced must neither free the new worker
/// nor be credited to the current attempt.
#[derive(Debug)]
pub struct WorkerReply {
    /// Slot index of the reporting worker
    pub slot: usize,
    /// Generation of the reporting worker within its slot
    pub generation: u64,
    /// Attempt this reply answers
    pub key: AttemptKey,
    /// Attempt result
    pub result: AttemptResult,
    /// Wall-clock execution time of the attempt
    pub execution_time: Duration,
    /// Rough payload + result footprint, in bytes
    pub memory_used: u64,
}

/// Handle to a spawned worker, owned by the dispatcher.
#[derive(Debug)]
pub struct WorkerHandle {
    /// Slot index
    pub slot: usize,
    /// Incremented each time the slot's worker is replaced
    pub generation: u64,
    /// Channel for sending jobs to this worker
    pub job_tx: mpsc::Sender<WorkerJob>,
    /// The worker's tokio task
    pub handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn a worker into `slot` at `generation` and return its handle.
    pub fn spawn(
        slot: usize,
        generation: u64,
        registry: Arc<HandlerRegistry>,
        reply_tx: mpsc::UnboundedSender<WorkerReply>,
    ) -> Self {
        // Capacity 1: a worker holds at most one job at a time.
        let (job_tx, job_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let worker = Worker {
                slot,
                generation,
                registry,
            };
            worker.run(job_rx, reply_tx).await;
        });

        tracing::debug!(slot, generation, "spawned worker");

        Self {
            slot,
            generation,
            job_tx,
            handle,
        }
    }

    /// Abort the worker's task. Used when reclaiming a slot after an
    /// attempt timeout and during pool termination.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

struct Worker {
    slot: usize,
    generation: u64,
    registry: Arc<HandlerRegistry>,
}

impl Worker {
    async fn run(
        &self,
        mut job_rx: mpsc::Receiver<WorkerJob>,
        reply_tx: mpsc::UnboundedSender<WorkerReply>,
    ) {
        while let Some(job) = job_rx.recv().await {
            let key = job.key.clone();
            tracing::debug!(
                slot = self.slot,
                task = %key.task_id,
                attempt = key.attempt,
                "worker picked up attempt"
            );

            let started = Instant::now();
            let payload_bytes = json_size(&job.task.payload);
            let result = self.execute(job.task).await;
            let execution_time = started.elapsed();

            let memory_used = payload_bytes
                + match &result {
                    AttemptResult::Completed(value) => json_size(value),
                    AttemptResult::Failed(_) => 0,
                };

            let reply = WorkerReply {
                slot: self.slot,
                generation: self.generation,
                key,
                result,
                execution_time,
                memory_used,
            };

            if reply_tx.send(reply).is_err() {
                // Dispatcher is gone; nothing left to work for.
                break;
            }
        }

        tracing::debug!(slot = self.slot, generation = self.generation, "worker stopped");
    }

    /// Execute one attempt with panic isolation: the handler runs in its
    /// own task so a panic surfaces as a join error, not a dead worker.
    async fn execute(&self, task: TaskSpec) -> AttemptResult {
        let handler = match self.registry.get(&task.kind) {
            Some(handler) => handler,
            None => {
                return AttemptResult::Failed(
                    PoolError::HandlerNotFound { kind: task.kind }.to_string(),
                );
            }
        };

        let handle = tokio::spawn(async move { handler.run(task).await });

        match handle.await {
            Ok(Ok(value)) => AttemptResult::Completed(value),
            Ok(Err(error)) => AttemptResult::Failed(error.to_string()),
            Err(join_error) => AttemptResult::Failed(format!("handler panicked: {join_error}")),
        }
    }
}

fn json_size(value: &serde_json::Value) -> u64 {
    serde_json::to_vec(value).map(|v| v.len() as u64).unwrap_or(0)
}
