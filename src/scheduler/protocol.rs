//! HTTP Protocol Definitions
//!
//! DTOs exchanged with HTTP clients of the task API, plus the route paths.
//! All bodies use camelCase field names.

use super::types::*;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_TASKS: &str = "/api/tasks";
pub const ENDPOINT_TASKS_BATCH: &str = "/api/tasks/batch";
pub const ENDPOINT_TASK_STATS: &str = "/api/tasks/stats";
pub const ENDPOINT_TASK_TYPES: &str = "/api/tasks/types";
pub const ENDPOINT_TASK_PRIORITIES: &str = "/api/tasks/priorities";
pub const ENDPOINT_TASK_STATUS: &str = "/api/tasks/:task_id";

/// Batch item handed to the scheduler.
pub const STATUS_SUBMITTED: &str = "SUBMITTED";
/// Batch item not handed over because the scheduler had stopped.
pub const STATUS_REJECTED: &str = "REJECTED";

/// One submission. Every field is optional; missing values get defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskRequest {
    #[serde(default)]
    pub task_name: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub task_data: Option<String>,
    /// Case-insensitive priority name; anything unknown means `NORMAL`.
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskResponse {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
    pub task_name: String,
    pub task_type: String,
    pub priority: TaskPriority,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchSubmitRequest {
    pub tasks: Vec<SubmitTaskRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitResponse {
    pub total_tasks: usize,
    pub tasks: Vec<BatchTaskEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTaskEntry {
    pub task_id: TaskId,
    pub task_name: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTypesResponse {
    pub task_types: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrioritiesResponse {
    pub priorities: Vec<PriorityEntry>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityEntry {
    pub name: String,
    pub value: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
