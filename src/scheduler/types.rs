use serde::{Deserialize, Serialize};
use std::fmt;

/// Retry budget every task starts with unless the submitter overrides it.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Status string returned by `query` for an id the scheduler has never seen.
pub const STATUS_NOT_FOUND: &str = "NOT_FOUND";

/// Status string carried by an acceptance receipt.
pub const STATUS_ACCEPTED: &str = "ACCEPTED";

/// Unique identifier for a task.
///
/// Wrapper around a UUID string. Callers may also supply their own id,
/// which is kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generates a new random UUID v4-based TaskId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Pending-queue ordering level. Higher weight is dispatched first.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Low,
        TaskPriority::Normal,
        TaskPriority::High,
        TaskPriority::Urgent,
    ];

    pub fn weight(&self) -> u8 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Normal => 2,
            TaskPriority::High => 3,
            TaskPriority::Urgent => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Normal => "NORMAL",
            TaskPriority::High => "HIGH",
            TaskPriority::Urgent => "URGENT",
        }
    }

    /// Lenient parse used at submission time.
    ///
    /// Case-insensitive. Absent or unrecognised values become `Normal`
    /// instead of being rejected.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return TaskPriority::Normal;
        };

        match raw.trim().to_ascii_uppercase().as_str() {
            "LOW" => TaskPriority::Low,
            "NORMAL" => TaskPriority::Normal,
            "HIGH" => TaskPriority::High,
            "URGENT" => TaskPriority::Urgent,
            other => {
                tracing::debug!("Unrecognised priority '{}', using NORMAL", other);
                TaskPriority::Normal
            }
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Waiting to be dispatched, either fresh or requeued after a failure.
    Pending,
    /// A worker is executing the task.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Last attempt failed. Terminal once the retry budget is spent.
    Failed,
    /// Reserved terminal state; no current flow produces it.
    Cancelled,
}

impl TaskStatus {
    pub fn name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of submitted work together with its lifecycle metadata.
///
/// The scheduler owns the authoritative copy. A worker receives its own copy
/// for one execution, mutates it, and hands it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Selects the handler in the registry; unknown kinds use the fallback.
    pub kind: String,
    pub payload: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Timestamps are epoch milliseconds.
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Task {
    /// Creates a `Pending` task with a fresh id.
    ///
    /// A missing priority is normalised to `Normal` here, once.
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        payload: impl Into<String>,
        priority: Option<TaskPriority>,
    ) -> Self {
        Self::with_id(TaskId::new(), name, kind, payload, priority)
    }

    pub fn with_id(
        id: TaskId,
        name: impl Into<String>,
        kind: impl Into<String>,
        payload: impl Into<String>,
        priority: Option<TaskPriority>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: kind.into(),
            payload: payload.into(),
            priority: priority.unwrap_or_default(),
            status: TaskStatus::Pending,
            created_at: now_ms(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Starts an attempt. Outcome fields left over from a previous attempt
    /// are cleared so that only the current attempt is reported.
    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(now_ms());
        self.completed_at = None;
        self.result = None;
        self.error_message = None;
    }

    pub fn mark_completed(&mut self, result: String) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(self.finish_time());
        self.result = Some(result);
        self.error_message = None;
    }

    /// Records a failed attempt and consumes one unit of retry budget.
    pub fn mark_failed(&mut self, error: String) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(self.finish_time());
        self.result = None;
        self.error_message = Some(error);
        self.retry_count += 1;
    }

    /// Puts a failed task back into `Pending`. `retry_count` is kept.
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Completed | TaskStatus::Cancelled => true,
            TaskStatus::Failed => !self.can_retry(),
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }

    /// Human-readable description of the current state, used by `query`.
    pub fn status_message(&self) -> String {
        match self.status {
            TaskStatus::Pending if self.retry_count > 0 => format!(
                "Awaiting retry {}/{}: {}",
                self.retry_count,
                self.max_retries,
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
            TaskStatus::Pending => "Task accepted and queued for processing".to_string(),
            TaskStatus::Running => "Task is being processed".to_string(),
            TaskStatus::Completed => {
                format!("Task found: {}", self.result.as_deref().unwrap_or_default())
            }
            TaskStatus::Failed => format!(
                "Task failed after {} attempt(s): {}",
                self.retry_count,
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
            TaskStatus::Cancelled => "Task was cancelled".to_string(),
        }
    }

    // The wall clock can step backwards; never report completion before start.
    fn finish_time(&self) -> u64 {
        let now = now_ms();
        match self.started_at {
            Some(started) => now.max(started),
            None => now,
        }
    }
}

/// Synchronous answer to a submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceReceipt {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
}

/// Answer to `query`: the last known state of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
}

impl StatusSnapshot {
    pub fn of(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status.name().to_string(),
            message: task.status_message(),
        }
    }

    pub fn not_found(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: STATUS_NOT_FOUND.to_string(),
            message: "Task not found".to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == STATUS_NOT_FOUND
    }
}

/// Consistent snapshot of the scheduler's counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    /// Live worker slots; shrinks when a slot is retired.
    pub worker_count: usize,
    pub total_received: u64,
    pub total_completed: u64,
    /// Every failed attempt, including ones that were retried afterwards.
    pub total_failed: u64,
    pub pending_queue_size: usize,
    pub total_tracked_tasks: usize,
    pub total_retried: u64,
    pub worker_restarts: u64,
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
