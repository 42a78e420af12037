//! Task service facade.
//!
//! Turns loosely-typed client requests into tasks, applies the submission
//! defaults, and shapes scheduler answers into response DTOs. This is the
//! surface the HTTP handlers (or any other front end) talk to.

use super::kinds::KNOWN_KINDS;
use super::manager::Scheduler;
use super::protocol::*;
use super::types::*;
use crate::error::Result;

pub const DEFAULT_TASK_NAME: &str = "Unnamed Task";
pub const DEFAULT_TASK_KIND: &str = "DEFAULT";

pub struct TaskService {
    scheduler: Scheduler,
    max_retries: u32,
}

impl TaskService {
    pub fn new(scheduler: Scheduler, max_retries: u32) -> Self {
        Self {
            scheduler,
            max_retries,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Submits one task and waits for the scheduler's acknowledgement.
    pub async fn submit(&self, request: SubmitTaskRequest) -> Result<SubmitTaskResponse> {
        let task = self.build_task(request);
        let (task_name, task_type, priority) = (task.name.clone(), task.kind.clone(), task.priority);

        let receipt = self.scheduler.submit(task).await?;

        Ok(SubmitTaskResponse {
            task_id: receipt.task_id,
            status: receipt.status,
            message: receipt.message,
            task_name,
            task_type,
            priority,
        })
    }

    /// Fire-and-forget submission of several tasks. No per-item
    /// acknowledgement is awaited; items are reported as `SUBMITTED`.
    ///
    /// If the scheduler stops partway through, the items that were not
    /// handed over are reported as `REJECTED`, so the caller can tell
    /// exactly which ones went in.
    pub fn submit_batch(&self, request: BatchSubmitRequest) -> BatchSubmitResponse {
        let total_tasks = request.tasks.len();
        let mut tasks = Vec::with_capacity(total_tasks);
        let mut submitted = 0;
        let mut stopped = false;

        for item in request.tasks {
            let task = self.build_task(item);
            let mut entry = BatchTaskEntry {
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                status: STATUS_SUBMITTED.to_string(),
            };

            if stopped || self.scheduler.submit_detached(task).is_err() {
                stopped = true;
                entry.status = STATUS_REJECTED.to_string();
            } else {
                submitted += 1;
            }
            tasks.push(entry);
        }

        if stopped {
            tracing::error!(
                "Batch interrupted: scheduler stopped after {} of {} tasks were submitted",
                submitted,
                total_tasks
            );
        } else {
            tracing::info!("Batch of {} tasks submitted", total_tasks);
        }

        BatchSubmitResponse { total_tasks, tasks }
    }

    pub async fn query_status(&self, task_id: &str) -> Result<StatusSnapshot> {
        self.scheduler.query(&TaskId::from(task_id)).await
    }

    pub async fn stats(&self) -> Result<SchedulerStats> {
        self.scheduler.stats().await
    }

    pub fn list_kinds(&self) -> TaskTypesResponse {
        TaskTypesResponse {
            task_types: KNOWN_KINDS.iter().map(|kind| kind.to_string()).collect(),
        }
    }

    pub fn list_priorities(&self) -> PrioritiesResponse {
        PrioritiesResponse {
            priorities: TaskPriority::ALL
                .iter()
                .map(|priority| PriorityEntry {
                    name: priority.name().to_string(),
                    value: priority.weight(),
                })
                .collect(),
        }
    }

    fn build_task(&self, request: SubmitTaskRequest) -> Task {
        let priority = TaskPriority::parse(request.priority.as_deref());

        Task::new(
            request.task_name.unwrap_or_else(|| DEFAULT_TASK_NAME.to_string()),
            request.task_type.unwrap_or_else(|| DEFAULT_TASK_KIND.to_string()),
            request.task_data.unwrap_or_default(),
            Some(priority),
        )
        .with_max_retries(self.max_retries)
    }
}
