//! Worker Implementation
//!
//! A worker is a sequential execution unit: it drains its own FIFO inbox one
//! task at a time and reports every outcome back to the scheduler. It never
//! touches the pending queue or the status table.
//!
//! ## Failure kinds
//! - **Task-level**: the handler returns `Err`. The task comes back `Failed`
//!   with `retry_count + 1`, exactly like a success comes back `Completed`.
//! - **Unit-level**: the handler panics. The run loop stops with a
//!   `WorkerFault` and the supervisor decides whether to restart the slot.

use super::manager::SchedulerCommand;
use super::registry::TaskHandlerRegistry;
use super::types::*;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Reports sent from a worker slot (or its supervisor) to the scheduler.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The worker picked the task up and is executing it.
    Started { slot: usize, task_id: TaskId },
    /// The attempt finished, successfully or with a task-level failure.
    Finished { slot: usize, task: Task },
    /// The unit crashed while executing `task`.
    Crashed {
        slot: usize,
        task: Task,
        detail: String,
    },
    /// The supervisor brought up a fresh worker for the slot.
    Restarted { slot: usize, restarts: u32 },
    /// The slot exceeded its restart budget. `orphans` were still queued in
    /// its inbox and were never started.
    Retired { slot: usize, orphans: Vec<Task> },
}

/// The worker unit itself failed while running a task.
#[derive(Debug)]
pub struct WorkerFault {
    /// The task that was in flight, already marked `Running`.
    pub task: Task,
    pub detail: String,
}

impl fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker fault on task {}: {}", self.task.id, self.detail)
    }
}

impl std::error::Error for WorkerFault {}

/// A single execution unit bound to one pool slot.
pub struct Worker {
    slot: usize,
    handlers: Arc<TaskHandlerRegistry>,
}

impl Worker {
    pub fn new(slot: usize, handlers: Arc<TaskHandlerRegistry>) -> Self {
        Self { slot, handlers }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Executes one task and returns it in a terminal attempt state.
    ///
    /// The handler runs on its own tokio task so that a panic is observed as
    /// a `JoinError` instead of unwinding through the worker.
    pub async fn execute(&self, mut task: Task) -> Result<Task, WorkerFault> {
        task.mark_running();
        tracing::info!("Worker {} processing task {} ({})", self.slot, task.id, task.kind);

        let handlers = self.handlers.clone();
        let attempt = task.clone();
        let outcome = tokio::spawn(async move { handlers.execute(&attempt).await }).await;

        match outcome {
            Ok(Ok(message)) => {
                let message = if message.is_empty() {
                    format!("Task {} completed", task.name)
                } else {
                    message
                };
                task.mark_completed(message);
                tracing::info!("Task {} completed by worker {}", task.id, self.slot);
                Ok(task)
            }
            Ok(Err(e)) => {
                let error = e.to_string();
                let error = if error.is_empty() {
                    "task handler failed".to_string()
                } else {
                    error
                };
                task.mark_failed(error);
                tracing::warn!(
                    "Task {} failed on worker {}: {}",
                    task.id,
                    self.slot,
                    task.error_message.as_deref().unwrap_or_default()
                );
                Ok(task)
            }
            Err(join_error) => {
                let detail = if join_error.is_panic() {
                    panic_detail(join_error.into_panic())
                } else {
                    "handler was cancelled".to_string()
                };
                Err(WorkerFault { task, detail })
            }
        }
    }

    /// Drains the inbox until it is closed.
    ///
    /// Returns `Ok(())` on a clean shutdown and `Err` when the unit crashed;
    /// the inbox is borrowed so that a restarted worker keeps the backlog.
    pub async fn run(
        &self,
        inbox: &mut UnboundedReceiver<Task>,
        scheduler: &UnboundedSender<SchedulerCommand>,
    ) -> Result<(), WorkerFault> {
        tracing::debug!("Worker {} started", self.slot);

        while let Some(task) = inbox.recv().await {
            self.report(
                scheduler,
                WorkerEvent::Started {
                    slot: self.slot,
                    task_id: task.id.clone(),
                },
            );

            let task = self.execute(task).await?;

            self.report(scheduler, WorkerEvent::Finished { slot: self.slot, task });
        }

        tracing::debug!("Worker {} inbox closed", self.slot);
        Ok(())
    }

    fn report(&self, scheduler: &UnboundedSender<SchedulerCommand>, event: WorkerEvent) {
        if scheduler.send(SchedulerCommand::Worker(event)).is_err() {
            tracing::debug!("Worker {}: scheduler stopped, dropping report", self.slot);
        }
    }
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn registry() -> Arc<TaskHandlerRegistry> {
        let registry = TaskHandlerRegistry::new();
        registry.register("ECHO", |task: Task| async move { Ok(format!("echo: {}", task.payload)) });
        registry.register("BROKEN", |_task: Task| async move {
            Err(anyhow::anyhow!("disk full"))
        });
        registry.register("PANIC", |_task: Task| async move {
            if true {
                panic!("boom");
            }
            Ok(String::new())
        });
        registry
    }

    #[tokio::test]
    async fn test_execute_success_sets_result_and_timestamps() {
        let worker = Worker::new(0, registry());
        let task = Task::new("echo", "ECHO", "hello", None);

        let done = worker.execute(task).await.unwrap();

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("echo: hello"));
        assert!(done.error_message.is_none());
        assert_eq!(done.retry_count, 0);
        assert!(done.started_at.unwrap() <= done.completed_at.unwrap());
    }

    #[tokio::test]
    async fn test_execute_failure_is_data_not_fault() {
        let worker = Worker::new(0, registry());
        let task = Task::new("broken", "BROKEN", "", None);

        let done = worker.execute(task).await.unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error_message.as_deref(), Some("disk full"));
        assert!(done.result.is_none());
        assert_eq!(done.retry_count, 1);
    }

    #[tokio::test]
    async fn test_execute_panic_is_unit_fault() {
        let worker = Worker::new(3, registry());
        let task = Task::new("panics", "PANIC", "", None);

        let fault = worker.execute(task).await.unwrap_err();

        assert_eq!(fault.detail, "boom");
        assert_eq!(fault.task.status, TaskStatus::Running);
        assert_eq!(fault.task.retry_count, 0);
    }

    #[tokio::test]
    async fn test_run_reports_in_fifo_order() {
        let worker = Worker::new(1, registry());
        let (task_tx, mut task_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        for payload in ["a", "b"] {
            task_tx.send(Task::new(payload, "ECHO", payload, None)).unwrap();
        }
        drop(task_tx);

        worker.run(&mut task_rx, &event_tx).await.unwrap();

        let mut finished = Vec::new();
        while let Ok(SchedulerCommand::Worker(event)) = event_rx.try_recv() {
            if let WorkerEvent::Finished { slot, task } = event {
                assert_eq!(slot, 1);
                finished.push(task.payload);
            }
        }
        assert_eq!(finished, vec!["a", "b"]);
    }
}
