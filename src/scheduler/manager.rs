//! Scheduler (Task Manager)
//!
//! The single writer of all scheduling state. One tokio task owns the worker
//! slots, the round-robin cursor, the pending queue, the status table and the
//! counters; everything else talks to it through `SchedulerCommand`s on one
//! unbounded inbox, so every mutation is applied in arrival order without a
//! lock.
//!
//! ## Flow
//! 1. **Submit**: the task is recorded in the status table and immediately
//!    sent to the next slot in round-robin order, regardless of how busy that
//!    slot is. Its inbox absorbs the backlog.
//! 2. **Result**: workers report each finished attempt. Failures with budget
//!    left are requeued as `Pending`; afterwards one pending task is drained.
//! 3. **Supervision**: crashed units are restarted by their supervisor; a
//!    slot that runs out of restarts is removed from the rotation and its
//!    backlog is redistributed.

use super::notify::{NoopSink, NotificationSink, TaskEvent, TaskEventKind};
use super::queue::PendingQueue;
use super::registry::TaskHandlerRegistry;
use super::supervisor::supervise;
use super::types::*;
use super::worker::WorkerEvent;
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

/// Messages processed by the scheduler loop, one at a time.
pub enum SchedulerCommand {
    /// `reply` is `None` for fire-and-forget submissions.
    Submit {
        task: Task,
        reply: Option<oneshot::Sender<AcceptanceReceipt>>,
    },
    Query {
        task_id: TaskId,
        reply: oneshot::Sender<StatusSnapshot>,
    },
    /// Full copy of the stored task record.
    Fetch {
        task_id: TaskId,
        reply: oneshot::Sender<Option<Task>>,
    },
    Stats {
        reply: oneshot::Sender<SchedulerStats>,
    },
    Worker(WorkerEvent),
    Shutdown {
        reply: oneshot::Sender<SchedulerStats>,
    },
}

/// Cloneable handle to a running scheduler.
///
/// Construct it once at startup and pass it to whatever needs to submit or
/// query tasks.
#[derive(Clone)]
pub struct Scheduler {
    tx: UnboundedSender<SchedulerCommand>,
}

impl Scheduler {
    /// Spawns the scheduler loop and its supervised worker pool on the
    /// current tokio runtime.
    pub fn spawn(config: &SchedulerConfig, handlers: Arc<TaskHandlerRegistry>) -> Self {
        Self::spawn_with_sink(config, handlers, Arc::new(NoopSink))
    }

    /// Like `spawn`, pushing lifecycle events to `sink`.
    pub fn spawn_with_sink(
        config: &SchedulerConfig,
        handlers: Arc<TaskHandlerRegistry>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let policy = config.restart_policy();

        let mut workers = Vec::with_capacity(config.worker_count);
        for slot in 0..config.worker_count {
            let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
            tokio::spawn(supervise(slot, handlers.clone(), inbox_rx, tx.clone(), policy));
            workers.push(WorkerSlot {
                slot,
                inbox: inbox_tx,
            });
            tracing::debug!("Created worker-{}", slot);
        }

        let state = SchedulerState::new(workers, sink);
        tokio::spawn(state.run(rx));

        tracing::info!("Scheduler started with {} workers", config.worker_count);

        Self { tx }
    }

    /// Submits a task and waits for the acceptance receipt (not for
    /// completion).
    pub async fn submit(&self, task: Task) -> Result<AcceptanceReceipt> {
        self.request(|reply| SchedulerCommand::Submit {
            task,
            reply: Some(reply),
        })
        .await
    }

    /// Submits a task without waiting for a receipt.
    pub fn submit_detached(&self, task: Task) -> Result<()> {
        self.tx
            .send(SchedulerCommand::Submit { task, reply: None })
            .map_err(|_| SchedulerError::Stopped)
    }

    /// Last known status of a task, or a `NOT_FOUND` snapshot.
    pub async fn query(&self, task_id: &TaskId) -> Result<StatusSnapshot> {
        let task_id = task_id.clone();
        self.request(|reply| SchedulerCommand::Query { task_id, reply })
            .await
    }

    /// Full stored record of a task.
    pub async fn task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        let task_id = task_id.clone();
        self.request(|reply| SchedulerCommand::Fetch { task_id, reply })
            .await
    }

    pub async fn stats(&self) -> Result<SchedulerStats> {
        self.request(|reply| SchedulerCommand::Stats { reply }).await
    }

    /// Stops the scheduler loop and returns the final counters. Workers
    /// drain what is already in their inboxes and then exit.
    pub async fn shutdown(&self) -> Result<SchedulerStats> {
        self.request(|reply| SchedulerCommand::Shutdown { reply })
            .await
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| SchedulerError::Stopped)?;
        reply_rx.await.map_err(|_| SchedulerError::Stopped)
    }
}

/// Sending side of one worker slot's inbox.
pub(crate) struct WorkerSlot {
    pub(crate) slot: usize,
    pub(crate) inbox: UnboundedSender<Task>,
}

/// State owned exclusively by the scheduler loop.
pub(crate) struct SchedulerState {
    /// Live slots in rotation order. Retired slots are removed.
    workers: Vec<WorkerSlot>,
    /// Round-robin cursor into `workers`.
    next: usize,
    pending: PendingQueue,
    tasks: HashMap<TaskId, Task>,
    received: u64,
    completed: u64,
    failed: u64,
    retried: u64,
    restarts: u64,
    sink: Arc<dyn NotificationSink>,
}

impl SchedulerState {
    pub(crate) fn new(workers: Vec<WorkerSlot>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            workers,
            next: 0,
            pending: PendingQueue::new(),
            tasks: HashMap::new(),
            received: 0,
            completed: 0,
            failed: 0,
            retried: 0,
            restarts: 0,
            sink,
        }
    }

    async fn run(mut self, mut inbox: UnboundedReceiver<SchedulerCommand>) {
        while let Some(command) = inbox.recv().await {
            match command {
                SchedulerCommand::Submit { task, reply } => {
                    let receipt = self.handle_submit(task);
                    if let Some(reply) = reply {
                        let _ = reply.send(receipt);
                    }
                }
                SchedulerCommand::Query { task_id, reply } => {
                    let _ = reply.send(self.snapshot(&task_id));
                }
                SchedulerCommand::Fetch { task_id, reply } => {
                    let _ = reply.send(self.tasks.get(&task_id).cloned());
                }
                SchedulerCommand::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                SchedulerCommand::Worker(event) => self.handle_worker_event(event),
                SchedulerCommand::Shutdown { reply } => {
                    let stats = self.stats();
                    tracing::info!(
                        "Scheduler stopped. Stats - Received: {}, Completed: {}, Failed: {}",
                        stats.total_received,
                        stats.total_completed,
                        stats.total_failed
                    );
                    // Closing the inboxes lets every supervisor wind down.
                    self.workers.clear();
                    let _ = reply.send(stats);
                    return;
                }
            }
        }
    }

    /// Records and dispatches a new task.
    ///
    /// A task id that is still live (pending, requeued or running) is not
    /// dispatched a second time and does not count as received; the caller
    /// gets a receipt for the copy already in the system. Ids whose task has
    /// finished may be submitted again.
    pub(crate) fn handle_submit(&mut self, task: Task) -> AcceptanceReceipt {
        if let Some(existing) = self.tasks.get(&task.id) {
            if !existing.is_terminal() {
                tracing::warn!(
                    "Task id {} is already {}, ignoring duplicate submission",
                    task.id,
                    existing.status
                );
                return AcceptanceReceipt {
                    task_id: task.id,
                    status: STATUS_ACCEPTED.to_string(),
                    message: format!("Task already tracked: {}", existing.status_message()),
                };
            }
            tracing::info!("Task id {} resubmitted after finishing", task.id);
        }

        self.received += 1;
        tracing::info!(
            "Received new task: {} (Priority: {}, Total received: {})",
            task.id,
            task.priority,
            self.received
        );

        self.tasks.insert(task.id.clone(), task.clone());

        let task_id = task.id.clone();
        let message = match self.assign(task) {
            Ok(_) => "Task accepted and queued for processing".to_string(),
            Err(task) => {
                self.pending.push(task);
                tracing::info!(
                    "Task {} added to pending queue (Queue size: {})",
                    task_id,
                    self.pending.len()
                );
                "Task accepted; no worker available, waiting in pending queue".to_string()
            }
        };

        AcceptanceReceipt {
            task_id,
            status: STATUS_ACCEPTED.to_string(),
            message,
        }
    }

    /// Round-robin dispatch. The cursor advances unconditionally and worker
    /// load is not consulted. Hands the task back when no slot is alive.
    fn assign(&mut self, mut task: Task) -> std::result::Result<usize, Task> {
        loop {
            if self.workers.is_empty() {
                return Err(task);
            }

            let index = self.next % self.workers.len();
            self.next = (index + 1) % self.workers.len();

            let slot = self.workers[index].slot;
            let task_id = task.id.clone();

            match self.workers[index].inbox.send(task) {
                Ok(()) => {
                    tracing::info!("Assigning task {} to worker-{}", task_id, slot);
                    return Ok(slot);
                }
                Err(mpsc::error::SendError(returned)) => {
                    // The supervisor gave up on the slot but its retirement
                    // notice has not been processed yet.
                    tracing::warn!("Worker-{} inbox closed, dropping slot from rotation", slot);
                    self.remove_slot(slot);
                    task = returned;
                }
            }
        }
    }

    fn remove_slot(&mut self, slot: usize) -> bool {
        let Some(index) = self.workers.iter().position(|w| w.slot == slot) else {
            return false;
        };

        self.workers.remove(index);
        if index < self.next {
            self.next -= 1;
        }
        if self.next >= self.workers.len() {
            self.next = 0;
        }
        true
    }

    pub(crate) fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Started { slot, task_id } => {
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.status = TaskStatus::Running;
                }
                tracing::debug!("Worker-{} started task {}", slot, task_id);
            }
            WorkerEvent::Finished { task, .. } => self.on_worker_result(task),
            WorkerEvent::Crashed {
                slot,
                mut task,
                detail,
            } => {
                tracing::warn!("Task {} lost its worker-{}: {}", task.id, slot, detail);
                task.mark_failed(format!("worker unit crashed: {detail}"));
                self.on_worker_result(task);
            }
            WorkerEvent::Restarted { slot, restarts } => {
                self.restarts += 1;
                tracing::info!("Worker-{} restarted ({} in current window)", slot, restarts);
            }
            WorkerEvent::Retired { slot, orphans } => self.retire(slot, orphans),
        }
    }

    /// Applies one finished attempt, then drains one pending task.
    pub(crate) fn on_worker_result(&mut self, mut task: Task) {
        match task.status {
            TaskStatus::Completed => {
                self.completed += 1;
                tracing::info!(
                    "Task {} completed successfully (Total completed: {})",
                    task.id,
                    self.completed
                );
                self.sink
                    .notify(&TaskEvent::from_task(TaskEventKind::Completed, &task));
            }
            TaskStatus::Failed => {
                self.failed += 1;
                tracing::warn!(
                    "Task {} failed (Retry: {}/{}, Total failed: {})",
                    task.id,
                    task.retry_count,
                    task.max_retries,
                    self.failed
                );

                if task.can_retry() {
                    tracing::info!("Retrying task {}", task.id);
                    task.requeue();
                    self.retried += 1;
                    self.pending.push(task.clone());
                    self.sink
                        .notify(&TaskEvent::from_task(TaskEventKind::Retrying, &task));
                } else {
                    tracing::error!(
                        "Task {} exhausted its retry budget: {}",
                        task.id,
                        task.error_message.as_deref().unwrap_or_default()
                    );
                    self.sink
                        .notify(&TaskEvent::from_task(TaskEventKind::Failed, &task));
                }
            }
            other => {
                tracing::warn!("Worker reported task {} in unexpected state {}", task.id, other);
            }
        }

        self.tasks.insert(task.id.clone(), task);
        self.process_next_pending();
    }

    fn process_next_pending(&mut self) {
        let Some(next) = self.pending.pop() else {
            return;
        };

        tracing::info!(
            "Processing next pending task: {} (Remaining: {})",
            next.id,
            self.pending.len()
        );

        if let Err(task) = self.assign(next) {
            tracing::warn!("No live workers, task {} stays pending", task.id);
            self.pending.push(task);
        }
    }

    fn retire(&mut self, slot: usize, orphans: Vec<Task>) {
        self.remove_slot(slot);
        tracing::error!(
            "Worker-{} retired, {} worker(s) left, {} queued task(s) to redistribute",
            slot,
            self.workers.len(),
            orphans.len()
        );

        for orphan in orphans {
            if let Err(task) = self.assign(orphan) {
                self.pending.push(task);
            }
        }

        if self.workers.is_empty() {
            tracing::error!(
                "No live workers left; {} task(s) parked in the pending queue",
                self.pending.len()
            );
        }
    }

    pub(crate) fn snapshot(&self, task_id: &TaskId) -> StatusSnapshot {
        match self.tasks.get(task_id) {
            Some(task) => StatusSnapshot::of(task),
            None => StatusSnapshot::not_found(task_id.clone()),
        }
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            worker_count: self.workers.len(),
            total_received: self.received,
            total_completed: self.completed,
            total_failed: self.failed,
            pending_queue_size: self.pending.len(),
            total_tracked_tasks: self.tasks.len(),
            total_retried: self.retried,
            worker_restarts: self.restarts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// State wired to bare channels so dispatch decisions can be observed
    /// without running real workers.
    fn state_with_slots(count: usize) -> (SchedulerState, Vec<UnboundedReceiver<Task>>) {
        let mut slots = Vec::new();
        let mut inboxes = Vec::new();
        for slot in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            slots.push(WorkerSlot { slot, inbox: tx });
            inboxes.push(rx);
        }
        (SchedulerState::new(slots, Arc::new(NoopSink)), inboxes)
    }

    fn task(name: &str) -> Task {
        Task::new(name, "NOTIFICATION", "payload", None)
    }

    fn drain(inbox: &mut UnboundedReceiver<Task>) -> Vec<Task> {
        std::iter::from_fn(|| inbox.try_recv().ok()).collect()
    }

    #[test]
    fn test_round_robin_gives_each_idle_worker_one_task() {
        let (mut state, mut inboxes) = state_with_slots(4);

        for name in ["t0", "t1", "t2"] {
            let receipt = state.handle_submit(task(name));
            assert_eq!(receipt.status, STATUS_ACCEPTED);
        }

        assert_eq!(drain(&mut inboxes[0])[0].name, "t0");
        assert_eq!(drain(&mut inboxes[1])[0].name, "t1");
        assert_eq!(drain(&mut inboxes[2])[0].name, "t2");
        assert!(drain(&mut inboxes[3]).is_empty());
        assert_eq!(state.stats().pending_queue_size, 0);
    }

    #[test]
    fn test_dispatch_ignores_load_and_wraps() {
        let (mut state, mut inboxes) = state_with_slots(2);

        for i in 0..5 {
            state.handle_submit(task(&format!("t{i}")));
        }

        let first: Vec<String> = drain(&mut inboxes[0]).into_iter().map(|t| t.name).collect();
        let second: Vec<String> = drain(&mut inboxes[1]).into_iter().map(|t| t.name).collect();
        assert_eq!(first, vec!["t0", "t2", "t4"]);
        assert_eq!(second, vec!["t1", "t3"]);
        assert_eq!(state.stats().pending_queue_size, 0);
    }

    #[test]
    fn test_zero_workers_parks_submissions() {
        let (mut state, _) = state_with_slots(0);

        let receipt = state.handle_submit(task("parked"));

        assert_eq!(receipt.status, STATUS_ACCEPTED);
        let stats = state.stats();
        assert_eq!(stats.worker_count, 0);
        assert_eq!(stats.pending_queue_size, 1);
        assert_eq!(stats.total_received, 1);
        assert_eq!(state.snapshot(&receipt.task_id).status, "PENDING");
    }

    #[test]
    fn test_failed_attempt_is_requeued_then_redispatched() {
        let (mut state, mut inboxes) = state_with_slots(1);
        let receipt = state.handle_submit(task("flaky"));
        let mut in_flight = drain(&mut inboxes[0]).remove(0);

        in_flight.mark_running();
        in_flight.mark_failed("timeout".to_string());
        state.on_worker_result(in_flight);

        // Requeued and drained straight back to the only worker.
        let again = drain(&mut inboxes[0]);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].status, TaskStatus::Pending);
        assert_eq!(again[0].retry_count, 1);

        let stats = state.stats();
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.total_retried, 1);
        assert_eq!(stats.pending_queue_size, 0);

        let snapshot = state.snapshot(&receipt.task_id);
        assert_eq!(snapshot.status, "PENDING");
        assert!(snapshot.message.contains("timeout"));
    }

    #[test]
    fn test_exhausted_task_stays_failed() {
        let (mut state, mut inboxes) = state_with_slots(1);
        let receipt = state.handle_submit(task("doomed").with_max_retries(1));
        let mut in_flight = drain(&mut inboxes[0]).remove(0);

        in_flight.mark_running();
        in_flight.mark_failed("bad input".to_string());
        state.on_worker_result(in_flight);

        assert!(drain(&mut inboxes[0]).is_empty());
        let stats = state.stats();
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.total_retried, 0);
        assert_eq!(stats.pending_queue_size, 0);
        assert_eq!(state.snapshot(&receipt.task_id).status, "FAILED");
    }

    #[test]
    fn test_started_event_marks_running() {
        let (mut state, _inboxes) = state_with_slots(1);
        let receipt = state.handle_submit(task("observed"));

        state.handle_worker_event(WorkerEvent::Started {
            slot: 0,
            task_id: receipt.task_id.clone(),
        });

        assert_eq!(state.snapshot(&receipt.task_id).status, "RUNNING");
    }

    #[test]
    fn test_live_duplicate_id_is_not_dispatched_twice() {
        let (mut state, mut inboxes) = state_with_slots(2);
        let id = TaskId::from("dup");
        let first = Task::with_id(id.clone(), "first", "NOTIFICATION", "a", None);
        let second = Task::with_id(id.clone(), "second", "NOTIFICATION", "b", None);

        state.handle_submit(first);
        state.handle_worker_event(WorkerEvent::Started {
            slot: 0,
            task_id: id.clone(),
        });
        let receipt = state.handle_submit(second);

        // Only the first copy ever reaches a worker.
        assert_eq!(receipt.task_id, id);
        assert_eq!(receipt.status, STATUS_ACCEPTED);
        assert!(receipt.message.starts_with("Task already tracked"));
        let mut in_flight = drain(&mut inboxes[0]);
        assert_eq!(in_flight.len(), 1);
        assert!(drain(&mut inboxes[1]).is_empty());

        let stats = state.stats();
        assert_eq!(stats.total_received, 1);
        assert_eq!(stats.total_tracked_tasks, 1);
        assert_eq!(state.snapshot(&id).status, "RUNNING");

        // Once finished, the id can be used again.
        let mut done = in_flight.remove(0);
        done.mark_running();
        done.mark_completed("sent".to_string());
        state.on_worker_result(done);

        state.handle_submit(Task::with_id(id.clone(), "again", "NOTIFICATION", "c", None));
        assert_eq!(drain(&mut inboxes[1])[0].name, "again");
        assert_eq!(state.stats().total_received, 2);
        assert_eq!(state.stats().total_completed, 1);
    }

    #[test]
    fn test_crash_counts_as_failed_attempt() {
        let (mut state, mut inboxes) = state_with_slots(1);
        state.handle_submit(task("crashy"));
        let mut in_flight = drain(&mut inboxes[0]).remove(0);
        in_flight.mark_running();

        state.handle_worker_event(WorkerEvent::Crashed {
            slot: 0,
            task: in_flight,
            detail: "boom".to_string(),
        });

        let retried = drain(&mut inboxes[0]).remove(0);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(
            retried.error_message.as_deref(),
            Some("worker unit crashed: boom")
        );
    }

    #[test]
    fn test_retired_slot_leaves_rotation_and_orphans_move() {
        let (mut state, mut inboxes) = state_with_slots(3);
        state.handle_submit(task("a")); // slot 0
        state.handle_submit(task("b")); // slot 1

        let orphan = task("orphan");
        state.handle_worker_event(WorkerEvent::Retired {
            slot: 1,
            orphans: vec![orphan],
        });
        assert_eq!(state.stats().worker_count, 2);

        // Cursor was at slot 2; the orphan goes there, then rotation is 0, 2.
        state.handle_submit(task("c"));
        state.handle_submit(task("d"));

        let zero: Vec<String> = drain(&mut inboxes[0]).into_iter().map(|t| t.name).collect();
        let two: Vec<String> = drain(&mut inboxes[2]).into_iter().map(|t| t.name).collect();
        assert_eq!(zero, vec!["a", "c"]);
        assert_eq!(two, vec!["orphan", "d"]);
    }

    #[test]
    fn test_closed_inbox_is_skipped() {
        let (mut state, mut inboxes) = state_with_slots(2);
        let closed = inboxes.remove(0);
        drop(closed);

        state.handle_submit(task("rerouted"));

        assert_eq!(drain(&mut inboxes[0])[0].name, "rerouted");
        assert_eq!(state.stats().worker_count, 1);
    }

    #[test]
    fn test_query_unknown_id() {
        let (state, _) = state_with_slots(1);
        let snapshot = state.snapshot(&TaskId::from("nonexistent"));
        assert!(snapshot.is_not_found());
        assert_eq!(snapshot.task_id.as_str(), "nonexistent");
    }
}
