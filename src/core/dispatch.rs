//! The dispatcher: a single event-driven task that owns the pending
//! queue, the worker table, the in-flight map, and the stats.
//!
//! All pool state is mutated from one `select!` loop, so queue order,
//! retry decisions, and counter updates never race. Workers, per-attempt
//! timers, and submitters only talk to the dispatcher through channels.

use crate::config::PoolConfig;
use crate::core::registry::HandlerRegistry;
use crate::core::scale::{FixedScale, LoadSnapshot, OnDemandScale, ScalePolicy};
use crate::core::worker::{AttemptResult, WorkerHandle, WorkerJob, WorkerReply};
use crate::error::{PoolError, PoolResult};
use crate::queue::PendingQueue;
use crate::stats::PoolStats;
use crate::task::{AttemptKey, TaskId, TaskOutcome, TaskSpec};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Requests from the pool handle to the dispatcher.
pub(crate) enum Command {
    /// Submit a task; the sender resolves with its terminal outcome.
    Submit {
        task: TaskSpec,
        reply: oneshot::Sender<PoolResult<TaskOutcome>>,
    },
    /// Settle everything and stop.
    Terminate { done: oneshot::Sender<()> },
}

/// Posted by a per-attempt timer when its deadline elapses.
struct TimeoutEvent {
    key: AttemptKey,
}

/// A task waiting for a worker, carrying its submission state across
/// retries.
struct PendingTask {
    task: TaskSpec,
    /// Attempts already dispatched for this task
    attempts_used: u32,
    reply: oneshot::Sender<PoolResult<TaskOutcome>>,
}

/// A task currently running on a worker.
struct RunningTask {
    task: TaskSpec,
    /// 1-based number of the attempt in flight
    attempt: u32,
    reply: oneshot::Sender<PoolResult<TaskOutcome>>,
    slot: usize,
    timer: JoinHandle<()>,
}

/// Spawn the dispatcher and its initial workers. Returns the command
/// channel the pool handle talks through.
pub(crate) fn spawn_dispatcher(
    config: PoolConfig,
    registry: Arc<HandlerRegistry>,
    stats: Arc<RwLock<PoolStats>>,
) -> mpsc::UnboundedSender<Command> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut dispatcher = Dispatcher::new(config, registry, stats, reply_tx, timeout_tx);
        dispatcher.run(command_rx, reply_rx, timeout_rx).await;
    });

    command_tx
}

struct Dispatcher {
    config: PoolConfig,
    registry: Arc<HandlerRegistry>,
    stats: Arc<RwLock<PoolStats>>,
    scale_policy: Box<dyn ScalePolicy>,
    /// Worker table indexed by slot
    slots: Vec<WorkerHandle>,
    /// Idle slot indices, oldest first
    idle: VecDeque<usize>,
    pending: PendingQueue<PendingTask>,
    running: HashMap<TaskId, RunningTask>,
    /// Ids of all queued or in-flight tasks, for duplicate rejection
    active_ids: HashSet<TaskId>,
    reply_tx: mpsc::UnboundedSender<WorkerReply>,
    timeout_tx: mpsc::UnboundedSender<TimeoutEvent>,
}

impl Dispatcher {
    fn new(
        config: PoolConfig,
        registry: Arc<HandlerRegistry>,
        stats: Arc<RwLock<PoolStats>>,
        reply_tx: mpsc::UnboundedSender<WorkerReply>,
        timeout_tx: mpsc::UnboundedSender<TimeoutEvent>,
    ) -> Self {
        let scale_policy: Box<dyn ScalePolicy> = if config.workers.auto_scale {
            Box::new(OnDemandScale)
        } else {
            Box::new(FixedScale)
        };

        let mut dispatcher = Self {
            config,
            registry,
            stats,
            scale_policy,
            slots: Vec::new(),
            idle: VecDeque::new(),
            pending: PendingQueue::new(),
            running: HashMap::new(),
            active_ids: HashSet::new(),
            reply_tx,
            timeout_tx,
        };

        for _ in 0..dispatcher.config.workers.min_workers {
            let slot = dispatcher.grow();
            dispatcher.idle.push_back(slot);
        }
        dispatcher.sync_gauges();

        tracing::info!(
            workers = dispatcher.slots.len(),
            auto_scale = dispatcher.config.workers.auto_scale,
            "dispatcher started"
        );

        dispatcher
    }

    async fn run(
        &mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut reply_rx: mpsc::UnboundedReceiver<WorkerReply>,
        mut timeout_rx: mpsc::UnboundedReceiver<TimeoutEvent>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(Command::Submit { task, reply }) => self.on_submit(task, reply),
                    Some(Command::Terminate { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        // Pool handle dropped without terminating.
                        self.shutdown().await;
                        break;
                    }
                },
                Some(reply) = reply_rx.recv() => self.on_reply(reply),
                Some(event) = timeout_rx.recv() => self.on_timeout(event),
            }
        }

        tracing::info!("dispatcher stopped");
    }

    fn on_submit(&mut self, task: TaskSpec, reply: oneshot::Sender<PoolResult<TaskOutcome>>) {
        if self.active_ids.contains(&task.id) {
            let _ = reply.send(Err(PoolError::DuplicateTask { id: task.id }));
            return;
        }

        tracing::debug!(task = %task.id, kind = %task.kind, priority = ?task.priority, "task submitted");

        self.active_ids.insert(task.id.clone());
        self.dispatch_or_enqueue(PendingTask {
            task,
            attempts_used: 0,
            reply,
        });
        self.sync_gauges();
    }

    fn on_reply(&mut self, reply: WorkerReply) {
        // Free the slot only if the reply comes from the slot's current
        // worker; a reply buffered before a timeout-triggered replacement
        // carries a stale generation.
        let from_current_worker = self
            .slots
            .get(reply.slot)
            .map(|slot| slot.generation == reply.generation)
            .unwrap_or(false);
        if from_current_worker {
            self.idle.push_back(reply.slot);
        }

        let entry = match self.running.get(&reply.key.task_id) {
            Some(entry) if entry.attempt == reply.key.attempt => {
                self.running.remove(&reply.key.task_id)
            }
            _ => None,
        };

        let Some(entry) = entry else {
            tracing::debug!(
                task = %reply.key.task_id,
                attempt = reply.key.attempt,
                "discarding reply for superseded attempt"
            );
            self.drain_pending();
            self.sync_gauges();
            return;
        };

        entry.timer.abort();

        match reply.result {
            AttemptResult::Completed(data) => {
                tracing::debug!(
                    task = %reply.key.task_id,
                    attempt = reply.key.attempt,
                    elapsed = ?reply.execution_time,
                    "task completed"
                );
                self.with_stats(|stats| {
                    stats.completed_tasks += 1;
                    stats.record_execution_time(reply.execution_time);
                });
                self.active_ids.remove(&reply.key.task_id);
                let _ = entry.reply.send(Ok(TaskOutcome::succeeded(
                    data,
                    reply.execution_time,
                    reply.memory_used,
                )));
            }
            AttemptResult::Failed(error) => {
                self.with_stats(|stats| stats.failed_attempts += 1);
                self.retry_or_fail(entry, error, reply.execution_time, reply.memory_used);
            }
        }

        self.drain_pending();
        self.sync_gauges();
    }

    fn on_timeout(&mut self, event: TimeoutEvent) {
        let entry = match self.running.get(&event.key.task_id) {
            Some(entry) if entry.attempt == event.key.attempt => {
                self.running.remove(&event.key.task_id)
            }
            // Attempt already settled; the timer lost the race.
            _ => return,
        };

        let Some(entry) = entry else { return };

        let timeout = entry.task.timeout;
        tracing::warn!(
            task = %event.key.task_id,
            attempt = event.key.attempt,
            ?timeout,
            slot = entry.slot,
            "attempt timed out, reclaiming worker"
        );

        // The worker is still stuck on the stale attempt; abort it and
        // respawn the slot so the retry has somewhere to run.
        self.replace_worker(entry.slot);
        self.idle.push_back(entry.slot);

        self.with_stats(|stats| {
            stats.failed_attempts += 1;
            stats.timed_out_attempts += 1;
            stats.worker_restarts += 1;
        });

        let error = PoolError::Timeout { timeout }.to_string();
        self.retry_or_fail(entry, error, timeout, 0);

        self.drain_pending();
        self.sync_gauges();
    }

    /// Apply the retry-or-fail decision for a failed or timed-out attempt.
    fn retry_or_fail(
        &mut self,
        entry: RunningTask,
        error: String,
        execution_time: std::time::Duration,
        memory_used: u64,
    ) {
        if entry.attempt <= entry.task.retries {
            tracing::warn!(
                task = %entry.task.id,
                attempt = entry.attempt,
                retries = entry.task.retries,
                error = %error,
                "attempt failed, redispatching"
            );
            self.dispatch_or_enqueue(PendingTask {
                attempts_used: entry.attempt,
                task: entry.task,
                reply: entry.reply,
            });
        } else {
            tracing::error!(
                task = %entry.task.id,
                attempts = entry.attempt,
                error = %error,
                "task failed terminally, retry budget exhausted"
            );
            self.with_stats(|stats| stats.failed_tasks += 1);
            self.active_ids.remove(&entry.task.id);
            let _ = entry
                .reply
                .send(Ok(TaskOutcome::failed(error, execution_time, memory_used)));
        }
    }

    /// Assign to an idle worker, grow the pool if the policy allows, or
    /// enqueue by priority. Retried tasks join the back of their tier.
    fn dispatch_or_enqueue(&mut self, entry: PendingTask) {
        if let Some(slot) = self.idle.pop_front() {
            self.start_attempt(slot, entry);
            return;
        }

        let load = LoadSnapshot {
            idle_workers: self.idle.len(),
            active_workers: self.slots.len(),
            queued_tasks: self.pending.len(),
            max_workers: self.config.workers.max_workers,
        };
        if self.scale_policy.should_grow(&load) {
            let slot = self.grow();
            self.start_attempt(slot, entry);
            return;
        }

        self.pending.push(entry.task.priority, entry);
    }

    /// Dispatch one attempt of `entry` to the worker in `slot`, arming
    /// its timeout timer.
    fn start_attempt(&mut self, slot: usize, entry: PendingTask) {
        let attempt = entry.attempts_used + 1;
        let key = AttemptKey {
            task_id: entry.task.id.clone(),
            attempt,
        };

        let timeout_tx = self.timeout_tx.clone();
        let timeout = entry.task.timeout;
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timeout_tx.send(TimeoutEvent { key: timer_key });
        });

        let job = WorkerJob {
            key: key.clone(),
            task: entry.task.clone(),
        };
        let unsent = match self.slots[slot].job_tx.try_send(job) {
            Ok(()) => None,
            Err(err) => Some(err.into_inner()),
        };
        if let Some(job) = unsent {
            // The slot's worker died with its channel full or closed;
            // a fresh worker always has capacity.
            tracing::warn!(slot, task = %entry.task.id, "worker rejected job, replacing");
            self.replace_worker(slot);
            self.with_stats(|stats| stats.worker_restarts += 1);
            if self.slots[slot].job_tx.try_send(job).is_err() {
                timer.abort();
                self.idle.push_back(slot);
                self.pending.push(entry.task.priority, entry);
                return;
            }
        }

        tracing::debug!(task = %key.task_id, attempt, slot, "attempt dispatched");

        self.with_stats(|stats| stats.total_attempts += 1);
        self.running.insert(
            entry.task.id.clone(),
            RunningTask {
                task: entry.task,
                attempt,
                reply: entry.reply,
                slot,
                timer,
            },
        );
    }

    /// Feed queued tasks to idle workers.
    fn drain_pending(&mut self) {
        while !self.idle.is_empty() && !self.pending.is_empty() {
            if let (Some(slot), Some(entry)) = (self.idle.pop_front(), self.pending.pop()) {
                self.start_attempt(slot, entry);
            }
        }
    }

    /// Spawn a worker into a new slot and return its index.
    fn grow(&mut self) -> usize {
        let slot = self.slots.len();
        self.slots.push(WorkerHandle::spawn(
            slot,
            0,
            Arc::clone(&self.registry),
            self.reply_tx.clone(),
        ));
        slot
    }

    /// Abort the worker in `slot` and respawn it at the next generation.
    fn replace_worker(&mut self, slot: usize) {
        let generation = self.slots[slot].generation + 1;
        self.slots[slot].abort();
        self.slots[slot] = WorkerHandle::spawn(
            slot,
            generation,
            Arc::clone(&self.registry),
            self.reply_tx.clone(),
        );
    }

    /// Settle every queued and in-flight promise with a pool-closed
    /// error, then tear down timers and workers.
    async fn shutdown(&mut self) {
        let queued = self.pending.drain();
        let running: Vec<RunningTask> = self.running.drain().map(|(_, entry)| entry).collect();
        tracing::info!(
            queued = queued.len(),
            in_flight = running.len(),
            "terminating pool"
        );

        for entry in queued {
            let _ = entry.reply.send(Err(PoolError::PoolClosed));
        }
        for entry in running {
            entry.timer.abort();
            let _ = entry.reply.send(Err(PoolError::PoolClosed));
        }
        self.active_ids.clear();

        for slot in &self.slots {
            slot.abort();
        }
        let handles: Vec<JoinHandle<()>> =
            self.slots.drain(..).map(|slot| slot.handle).collect();
        let _ = tokio::time::timeout(
            self.config.workers.shutdown_timeout,
            futures::future::join_all(handles),
        )
        .await;
        self.idle.clear();

        self.sync_gauges();
    }

    fn with_stats<F: FnOnce(&mut PoolStats)>(&self, f: F) {
        let mut guard = self.stats.write().unwrap_or_else(|err| err.into_inner());
        f(&mut guard);
    }

    fn sync_gauges(&self) {
        let queued = self.pending.len();
        let running = self.running.len();
        let workers = self.slots.len();
        self.with_stats(|stats| {
            stats.queued_tasks = queued;
            stats.running_tasks = running;
            stats.active_workers = workers;
        });
    }
}
