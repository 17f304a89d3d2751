use super::{attachment, ActingUser, ApiResult, FileUpload};
use crate::config::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use cacd_core::archive::{MergeOptions, MergeReport, RollbackReport};
use cacd_core::reconcile::ReconcileSummary;
use cacd_core::{projects, EntityKind, HistoryEntry, Project, ProjectId, SnapshotId, SnapshotMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Create a project seeded with the global rules and templates
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    user: ActingUser,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = projects::create_project(
        &state.store,
        &state.hub,
        &req.name,
        req.description,
        &req.origin,
        user.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub origin: String,
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListProjectsResponse>> {
    let projects = state.store.list_projects()?;
    Ok(Json(ListProjectsResponse { projects }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListProjectsResponse {
    pub projects: Vec<Project>,
}

pub async fn project_by_origin(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OriginQuery>,
) -> ApiResult<Json<Project>> {
    Ok(Json(projects::project_by_origin(&state.store, &query.origin)?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OriginQuery {
    pub origin: String,
}

/// Download a project archive; a copy is kept in the archive directory
pub async fn export_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
    user: ActingUser,
) -> ApiResult<Response> {
    let exported = state
        .archive
        .export(ProjectId(project_id), user.as_deref())
        .await?;
    let filename = exported
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("project_{}.zip", project_id));
    attachment("application/zip", &filename, exported.bytes)
}

/// Create a new project from an uploaded archive
pub async fn import_project(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
    user: ActingUser,
    FileUpload(data): FileUpload,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = state
        .archive
        .import(&data, &query.origin, query.name.as_deref(), user.as_deref())?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportQuery {
    pub origin: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Reconcile an uploaded archive into a project
pub async fn merge_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
    Query(options): Query<MergeOptions>,
    user: ActingUser,
    FileUpload(data): FileUpload,
) -> ApiResult<Json<MergeResponse>> {
    let report = state
        .archive
        .merge(ProjectId(project_id), &data, options, user.as_deref())?;
    Ok(Json(MergeResponse {
        summary: report.summary(),
        report,
    }))
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub summary: BTreeMap<EntityKind, ReconcileSummary>,
    pub report: MergeReport,
}

pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<Json<ListHistoryResponse>> {
    let project = state.store.require_project(ProjectId(project_id))?;
    let history = state.store.list::<HistoryEntry>(Some(project.id))?;
    Ok(Json(ListHistoryResponse { history }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListHistoryResponse {
    pub history: Vec<HistoryEntry>,
}

pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
    user: ActingUser,
    req: Option<Json<SnapshotRequest>>,
) -> ApiResult<(StatusCode, Json<SnapshotMeta>)> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let reason = req.reason.as_deref().unwrap_or("manual");
    let meta = state
        .archive
        .snapshot(ProjectId(project_id), user.as_deref(), reason)
        .await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<Json<ListSnapshotsResponse>> {
    let snapshots = state.archive.list_snapshots(ProjectId(project_id))?;
    Ok(Json(ListSnapshotsResponse { snapshots }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSnapshotsResponse {
    pub snapshots: Vec<SnapshotMeta>,
}

pub async fn rollback_snapshot(
    State(state): State<Arc<AppState>>,
    Path((project_id, snapshot_id)): Path<(u64, Uuid)>,
    user: ActingUser,
) -> ApiResult<Json<RollbackReport>> {
    let report = state
        .archive
        .rollback(ProjectId(project_id), SnapshotId(snapshot_id), user.as_deref())
        .await?;
    Ok(Json(report))
}

/// Snapshot a project as a release and note it in the memory bank
pub async fn release(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
    user: ActingUser,
    req: Option<Json<ReleaseRequest>>,
) -> ApiResult<Json<SnapshotMeta>> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let meta = state
        .archive
        .release(
            ProjectId(project_id),
            req.version.as_deref(),
            user.as_deref(),
            &state.bank,
        )
        .await?;
    Ok(Json(meta))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReleaseRequest {
    #[serde(default)]
    pub version: Option<String>,
}

pub async fn complete_epic(
    State(state): State<Arc<AppState>>,
    Path((project_id, epic_id)): Path<(u64, String)>,
    user: ActingUser,
) -> ApiResult<Json<SnapshotMeta>> {
    let meta = state
        .archive
        .complete_epic(ProjectId(project_id), &epic_id, user.as_deref(), &state.bank)
        .await?;
    Ok(Json(meta))
}
