use super::{attachment, ApiResult, FileUpload};
use crate::config::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use cacd_core::federation::FederationKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Store a file in an origin's drop-box
pub async fn push(
    State(state): State<Arc<AppState>>,
    Path((origin, kind, file)): Path<(String, String, String)>,
    FileUpload(data): FileUpload,
) -> ApiResult<(StatusCode, Json<PushResponse>)> {
    let kind: FederationKind = kind.parse()?;
    state.federation.push(&origin, kind, &file, &data)?;
    state
        .hub
        .message(format!("{} {} pushed to {}", kind, file, origin));
    Ok((
        StatusCode::CREATED,
        Json(PushResponse {
            status: "uploaded".to_string(),
            origin,
            kind,
            file,
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushResponse {
    pub status: String,
    pub origin: String,
    pub kind: FederationKind,
    pub file: String,
}

pub async fn pull(
    State(state): State<Arc<AppState>>,
    Path((origin, kind, file)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let kind: FederationKind = kind.parse()?;
    let data = state.federation.pull(&origin, kind, &file)?;
    let content_type = mime_guess::from_path(&file).first_or_octet_stream();
    attachment(content_type.as_ref(), &file, data)
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path((origin, kind)): Path<(String, String)>,
) -> ApiResult<Json<ListFilesResponse>> {
    let kind: FederationKind = kind.parse()?;
    let files = state.federation.list(&origin, kind)?;
    Ok(Json(ListFilesResponse { kind, files }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub kind: FederationKind,
    pub files: Vec<String>,
}

pub async fn backlog(
    State(state): State<Arc<AppState>>,
    Path(origin): Path<String>,
) -> ApiResult<Json<TextResponse>> {
    let content = state.federation.backlog(&origin)?;
    Ok(Json(TextResponse { origin, content }))
}

pub async fn feedback(
    State(state): State<Arc<AppState>>,
    Path(origin): Path<String>,
) -> ApiResult<Json<TextResponse>> {
    let content = state.federation.feedback(&origin)?;
    Ok(Json(TextResponse { origin, content }))
}

pub async fn knowledge_package(
    State(state): State<Arc<AppState>>,
    Path((origin, name)): Path<(String, String)>,
) -> ApiResult<Json<TextResponse>> {
    let content = state.federation.knowledge_package(&origin, &name)?;
    Ok(Json(TextResponse { origin, content }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextResponse {
    pub origin: String,
    pub content: String,
}

/// Zip everything an origin has shared
pub async fn export_origin(
    State(state): State<Arc<AppState>>,
    Path(origin): Path<String>,
) -> ApiResult<Response> {
    let path = state.federation.export_origin(&origin)?;
    let data = tokio::fs::read(&path).await?;
    attachment("application/zip", &format!("export_{}.zip", origin), data)
}
