use super::{attachment, ActingUser, ApiResult, FileUpload};
use crate::config::AppState;
use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use cacd_core::memory_bank::BankMerge;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub async fn import(
    State(state): State<Arc<AppState>>,
    user: ActingUser,
    FileUpload(data): FileUpload,
) -> ApiResult<Json<FilesResponse>> {
    let files = state.bank.import(&data)?;
    state
        .bank
        .append_audit(user.as_deref(), &format!("Memory bank import: {} file(s)", files.len()))?;
    Ok(Json(FilesResponse::new("imported", files)))
}

pub async fn export(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    attachment("application/zip", "memory-bank.zip", state.bank.export()?)
}

/// Diff an archive against the bank; applied only with `dry_run=false`
pub async fn merge(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MergeQuery>,
    user: ActingUser,
    FileUpload(data): FileUpload,
) -> ApiResult<Json<BankMerge>> {
    let merged = state.bank.merge(&data, query.dry_run)?;
    if !merged.dry_run {
        state.bank.append_audit(
            user.as_deref(),
            &format!("Memory bank merge: {} change(s)", merged.changes.len()),
        )?;
    }
    Ok(Json(merged))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MergeQuery {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}

/// Replace the whole bank with the archive content
pub async fn rollback(
    State(state): State<Arc<AppState>>,
    user: ActingUser,
    FileUpload(data): FileUpload,
) -> ApiResult<Json<FilesResponse>> {
    let files = state.bank.rollback(&data)?;
    state
        .bank
        .append_audit(user.as_deref(), &format!("Memory bank rollback: {} file(s)", files.len()))?;
    state.hub.message("Memory bank rolled back");
    Ok(Json(FilesResponse::new("rolled_back", files)))
}

pub async fn batch(
    State(state): State<Arc<AppState>>,
    FileUpload(data): FileUpload,
) -> ApiResult<Json<FilesResponse>> {
    let files = state.bank.batch(&data)?;
    Ok(Json(FilesResponse::new("updated", files)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesResponse {
    pub status: String,
    pub files: Vec<String>,
}

impl FilesResponse {
    fn new(status: &str, files: Vec<String>) -> Self {
        Self {
            status: status.to_string(),
            files,
        }
    }
}
