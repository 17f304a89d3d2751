use super::{ActingUser, ApiResult};
use crate::config::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cacd_core::{Doc, DocVersion, ProjectId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub async fn create_doc(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
    user: ActingUser,
    Json(req): Json<CreateDocRequest>,
) -> ApiResult<(StatusCode, Json<Doc>)> {
    let doc = state.docs.create(
        ProjectId(project_id),
        &req.doc_type,
        &req.content,
        user.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(doc)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDocRequest {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub content: String,
}

pub async fn list_docs(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<Json<ListDocsResponse>> {
    let project = state.store.require_project(ProjectId(project_id))?;
    let docs = state.docs.list(project.id)?;
    Ok(Json(ListDocsResponse { docs }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListDocsResponse {
    pub docs: Vec<Doc>,
}

pub async fn get_doc(
    State(state): State<Arc<AppState>>,
    Path((project_id, doc_id)): Path<(u64, u64)>,
) -> ApiResult<Json<Doc>> {
    Ok(Json(state.docs.get(ProjectId(project_id), doc_id)?))
}

/// Update a doc; every update is kept as a new version
pub async fn update_doc(
    State(state): State<Arc<AppState>>,
    Path((project_id, doc_id)): Path<(u64, u64)>,
    user: ActingUser,
    Json(req): Json<UpdateDocRequest>,
) -> ApiResult<Json<Doc>> {
    let doc = state.docs.update(
        ProjectId(project_id),
        doc_id,
        req.doc_type.as_deref(),
        req.content.as_deref(),
        user.as_deref(),
    )?;
    Ok(Json(doc))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateDocRequest {
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path((project_id, doc_id)): Path<(u64, u64)>,
) -> ApiResult<Json<ListVersionsResponse>> {
    let versions = state.docs.versions(ProjectId(project_id), doc_id)?;
    Ok(Json(ListVersionsResponse { versions }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListVersionsResponse {
    pub versions: Vec<DocVersion>,
}

pub async fn rollback_doc(
    State(state): State<Arc<AppState>>,
    Path((project_id, doc_id)): Path<(u64, u64)>,
    user: ActingUser,
    Json(req): Json<RollbackDocRequest>,
) -> ApiResult<Json<Doc>> {
    let doc = state
        .docs
        .rollback(ProjectId(project_id), doc_id, req.version, user.as_deref())?;
    Ok(Json(doc))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RollbackDocRequest {
    pub version: u32,
}
