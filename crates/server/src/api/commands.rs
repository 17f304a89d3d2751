use super::ApiResult;
use crate::config::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use cacd_core::commands::{CommandDefinition, CommandOutcome};
use cacd_core::Record;
use serde::Serialize;
use std::sync::Arc;

/// Run a custom command with JSON parameters
pub async fn run_command(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    params: Option<Json<Record>>,
) -> ApiResult<Json<CommandOutcome>> {
    let params = params.map(|Json(params)| params).unwrap_or_default();
    let commands = state.commands.clone();
    // Actions touch the filesystem
    let outcome = tokio::task::spawn_blocking(move || commands.run(&name, params)).await??;
    Ok(Json(outcome))
}

pub async fn list_commands(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListCommandsResponse>> {
    Ok(Json(ListCommandsResponse {
        commands: state.commands.list_definitions()?,
        actions: state.commands.registry().names(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ListCommandsResponse {
    pub commands: Vec<CommandDefinition>,
    pub actions: Vec<String>,
}
