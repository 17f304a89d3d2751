use super::{ActingUser, ApiResult};
use crate::config::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cacd_core::tasks::{self, CompletedTask, NewTask};
use cacd_core::{ContextEntry, ProjectId, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Create a task from a command, applying the scope's priority rules
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    user: ActingUser,
    Json(req): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state.tasks.process_command(req, user.as_deref())?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    user: ActingUser,
    Json(req): Json<CompleteTaskRequest>,
) -> ApiResult<Json<CompletedTask>> {
    let completed =
        state
            .tasks
            .complete_task(req.project_id, &task_id, &req.result, user.as_deref())?;
    Ok(Json(completed))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteTaskRequest {
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub result: String,
}

pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ContextEntry>> {
    Ok(Json(state.tasks.get_context(&task_id)?))
}

pub async fn generate_report(
    Json(context): Json<serde_json::Value>,
) -> ApiResult<Json<GenerateReportResponse>> {
    Ok(Json(GenerateReportResponse {
        report: tasks::generate_report(&context),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateReportResponse {
    pub report: String,
}
