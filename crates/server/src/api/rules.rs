use super::{attachment, ApiResult, FileUpload};
use crate::config::AppState;
use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use cacd_core::rules::{RuleEdit, RuleEditResult, RuleFile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub async fn list_rules(State(state): State<Arc<AppState>>) -> ApiResult<Json<ListRulesResponse>> {
    let rules = state.rules.list()?;
    Ok(Json(ListRulesResponse { rules }))
}

#[derive(Debug, Serialize)]
pub struct ListRulesResponse {
    pub rules: Vec<RuleFile>,
}

/// Create or update several MDC rules; nothing is written if any is invalid
pub async fn apply_rules(
    State(state): State<Arc<AppState>>,
    Json(edits): Json<Vec<RuleEdit>>,
) -> ApiResult<Json<ApplyRulesResponse>> {
    let results = state.rules.apply(edits)?;
    state
        .hub
        .message(format!("{} MDC rule(s) created or updated", results.len()));
    Ok(Json(ApplyRulesResponse { results }))
}

#[derive(Debug, Serialize)]
pub struct ApplyRulesResponse {
    pub results: Vec<RuleEditResult>,
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RulePathQuery>,
) -> ApiResult<Json<DeleteRuleResponse>> {
    state.rules.delete(&query.path)?;
    state.hub.message(format!("MDC rule {} deleted", query.path));
    Ok(Json(DeleteRuleResponse {
        status: "deleted".to_string(),
        path: query.path,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RulePathQuery {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRuleResponse {
    pub status: String,
    pub path: String,
}

pub async fn export_rules(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    attachment("application/zip", "rules.zip", state.rules.export_zip()?)
}

pub async fn import_rules(
    State(state): State<Arc<AppState>>,
    FileUpload(data): FileUpload,
) -> ApiResult<Json<ImportRulesResponse>> {
    let imported = state.rules.import_zip(&data)?;
    Ok(Json(ImportRulesResponse { imported }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportRulesResponse {
    pub imported: usize,
}
