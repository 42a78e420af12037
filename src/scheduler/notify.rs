//! Completion notifications.
//!
//! The scheduler pushes an event to a `NotificationSink` whenever a task
//! reaches a terminal state or is requeued for another attempt. Fan-out to
//! actual clients (WebSocket sessions, webhooks, ...) belongs to whoever
//! implements the sink.

use super::types::{Task, TaskId, TaskStatus, now_ms};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventKind {
    Completed,
    Failed,
    Retrying,
}

/// A lifecycle event pushed to the notification sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task_id: TaskId,
    pub task_name: String,
    pub status: TaskStatus,
    pub message: String,
    pub retry_count: u32,
    pub timestamp: u64,
}

impl TaskEvent {
    pub fn from_task(kind: TaskEventKind, task: &Task) -> Self {
        Self {
            kind,
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            status: task.status,
            message: task.status_message(),
            retry_count: task.retry_count,
            timestamp: now_ms(),
        }
    }
}

/// Receiver of task lifecycle events.
///
/// Called from the scheduler's message loop, so implementations must not
/// block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &TaskEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _event: &TaskEvent) {}
}

/// Fans events out to any number of in-process subscribers.
///
/// Slow subscribers lag and lose the oldest events rather than slowing the
/// scheduler down.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<TaskEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: &TaskEvent) {
        // No subscribers is not an error.
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!("No subscribers for event on task {}", event.task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_all_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        let mut task = Task::new("report", "REPORT_GENERATION", "q1", None);
        task.mark_running();
        task.mark_completed("Report generated: q1".to_string());
        sink.notify(&TaskEvent::from_task(TaskEventKind::Completed, &task));

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.kind, TaskEventKind::Completed);
        assert_eq!(a.status, TaskStatus::Completed);
        assert_eq!(a.task_id, task.id);
    }

    #[test]
    fn test_broadcast_sink_without_subscribers_is_silent() {
        let sink = BroadcastSink::default();
        let task = Task::new("nobody listens", "API_CALL", "", None);
        sink.notify(&TaskEvent::from_task(TaskEventKind::Failed, &task));
    }
}
