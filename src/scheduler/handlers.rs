use super::protocol::*;
use super::service::TaskService;
use super::types::*;

use axum::extract::rejection::JsonRejection;
use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

type ErrorReply = (StatusCode, Json<ErrorResponse>);

pub async fn handle_submit_task(
    Extension(service): Extension<Arc<TaskService>>,
    body: Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ErrorReply> {
    let Json(req) = body.map_err(|e| {
        tracing::debug!("Rejected submit body: {}", e);
        bad_request("Missing request body")
    })?;

    match service.submit(req).await {
        Ok(response) => {
            tracing::info!("Task submitted successfully: {}", response.task_id);
            Ok((StatusCode::OK, Json(response)))
        }
        Err(e) => {
            tracing::error!("Failed to submit task: {}", e);
            Err(unavailable(format!("Task submission failed: {e}")))
        }
    }
}

pub async fn handle_submit_batch(
    Extension(service): Extension<Arc<TaskService>>,
    body: Result<Json<BatchSubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchSubmitResponse>), ErrorReply> {
    let Json(req) = body.map_err(|e| {
        tracing::debug!("Rejected batch body: {}", e);
        bad_request("Missing tasks array")
    })?;

    Ok((StatusCode::OK, Json(service.submit_batch(req))))
}

/// Unknown ids are answered with `200` and a `NOT_FOUND` status, not `404`.
pub async fn handle_get_task_status(
    Extension(service): Extension<Arc<TaskService>>,
    Path(task_id): Path<String>,
) -> Result<(StatusCode, Json<StatusSnapshot>), ErrorReply> {
    match service.query_status(&task_id).await {
        Ok(snapshot) => {
            tracing::debug!("Task status query: {} -> {}", task_id, snapshot.status);
            Ok((StatusCode::OK, Json(snapshot)))
        }
        Err(e) => Err(unavailable(format!("Query failed: {e}"))),
    }
}

pub async fn handle_get_stats(
    Extension(service): Extension<Arc<TaskService>>,
) -> Result<(StatusCode, Json<SchedulerStats>), ErrorReply> {
    match service.stats().await {
        Ok(stats) => Ok((StatusCode::OK, Json(stats))),
        Err(e) => Err(unavailable(format!("Stats retrieval failed: {e}"))),
    }
}

pub async fn handle_get_task_types(
    Extension(service): Extension<Arc<TaskService>>,
) -> (StatusCode, Json<TaskTypesResponse>) {
    (StatusCode::OK, Json(service.list_kinds()))
}

pub async fn handle_get_priorities(
    Extension(service): Extension<Arc<TaskService>>,
) -> (StatusCode, Json<PrioritiesResponse>) {
    (StatusCode::OK, Json(service.list_priorities()))
}

/// Routes of the task API with the service injected as an extension.
pub fn router(service: Arc<TaskService>) -> Router {
    Router::new()
        .route(ENDPOINT_TASKS, post(handle_submit_task))
        .route(ENDPOINT_TASKS_BATCH, post(handle_submit_batch))
        .route(ENDPOINT_TASK_STATS, get(handle_get_stats))
        .route(ENDPOINT_TASK_TYPES, get(handle_get_task_types))
        .route(ENDPOINT_TASK_PRIORITIES, get(handle_get_priorities))
        .route(ENDPOINT_TASK_STATUS, get(handle_get_task_status))
        .layer(Extension(service))
}

fn bad_request(message: &str) -> ErrorReply {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

fn unavailable(message: String) -> ErrorReply {
    (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse::new(message)))
}
