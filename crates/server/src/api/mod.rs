use crate::config::{AppState, ServerConfig};
use crate::graphql;
use crate::websocket;
use anyhow::Result;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use cacd_core::reconcile::ReconcileError;
use cacd_core::{find_cacd_error, CacdError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod commands;
mod docs;
mod federation;
mod memory_bank;
mod projects;
mod rules;
mod tasks;
mod upload;
mod user;

pub use upload::FileUpload;
pub use user::ActingUser;

/// Largest accepted request body; archives are uploaded whole
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Start the API server; returns after a ctrl-c triggered graceful shutdown
pub async fn serve(addr: &str, config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config)?;
    let scheduler = state.start_scheduler(&config)?;
    let hub = state.hub.clone();

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            hub.shutdown();
        })
        .await?;

    if let Some(handle) = scheduler {
        handle.await?;
    }

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    let schema = graphql::build_schema(state.clone());

    Router::new()
        .route("/api/health", get(health_check))
        // Projects and archives
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/api/projects/by_origin", get(projects::project_by_origin))
        .route("/api/projects/import", post(projects::import_project))
        .route("/api/projects/{project_id}/export", get(projects::export_project))
        .route("/api/projects/{project_id}/merge", post(projects::merge_project))
        .route("/api/projects/{project_id}/history", get(projects::list_history))
        .route(
            "/api/projects/{project_id}/snapshots",
            get(projects::list_snapshots).post(projects::create_snapshot),
        )
        .route(
            "/api/projects/{project_id}/snapshots/{snapshot_id}/rollback",
            post(projects::rollback_snapshot),
        )
        .route("/api/projects/{project_id}/release", post(projects::release))
        .route(
            "/api/projects/{project_id}/epics/{epic_id}/complete",
            post(projects::complete_epic),
        )
        // Docs
        .route(
            "/api/projects/{project_id}/docs",
            get(docs::list_docs).post(docs::create_doc),
        )
        .route(
            "/api/projects/{project_id}/docs/{doc_id}",
            get(docs::get_doc).put(docs::update_doc),
        )
        .route(
            "/api/projects/{project_id}/docs/{doc_id}/versions",
            get(docs::list_versions),
        )
        .route(
            "/api/projects/{project_id}/docs/{doc_id}/rollback",
            post(docs::rollback_doc),
        )
        // Tasks
        .route("/api/tasks", post(tasks::create_task))
        .route("/api/tasks/{task_id}/complete", post(tasks::complete_task))
        .route("/api/context/{task_id}", get(tasks::get_context))
        .route("/api/generate_report", post(tasks::generate_report))
        // MDC rules
        .route(
            "/api/rules",
            get(rules::list_rules)
                .post(rules::apply_rules)
                .delete(rules::delete_rule),
        )
        .route("/api/rules/export", get(rules::export_rules))
        .route("/api/rules/import", post(rules::import_rules))
        // Memory bank
        .route("/api/memory-bank/import", post(memory_bank::import))
        .route("/api/memory-bank/export", get(memory_bank::export))
        .route("/api/memory-bank/merge", post(memory_bank::merge))
        .route("/api/memory-bank/rollback", post(memory_bank::rollback))
        .route("/api/memory-bank/batch", post(memory_bank::batch))
        // Federation
        .route("/api/federation/{origin}/export", get(federation::export_origin))
        .route("/api/federation/{origin}/backlog", get(federation::backlog))
        .route("/api/federation/{origin}/feedback", get(federation::feedback))
        .route(
            "/api/federation/{origin}/knowledge/{name}",
            get(federation::knowledge_package),
        )
        .route("/api/federation/{origin}/files/{kind}", get(federation::list_files))
        .route(
            "/api/federation/{origin}/files/{kind}/{file}",
            get(federation::pull).post(federation::push),
        )
        // Custom commands
        .route("/api/custom_commands", get(commands::list_commands))
        .route("/api/custom_command/{name}", post(commands::run_command))
        // Notifications
        .route("/api/ws/notify", get(websocket::ws_handler))
        // GraphQL
        .route(
            "/api/graphql",
            get(graphql::graphql_playground).post(graphql::graphql_handler),
        )
        .route("/api/graphql/ws", get(graphql::graphql_subscription_handler))
        .layer(Extension(schema))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cacd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// A file download response
fn attachment(content_type: &str, filename: &str, bytes: Vec<u8>) -> ApiResult<Response> {
    let response = Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))?;
    Ok(response)
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Custom error type for API handlers
pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match find_cacd_error(&self.0) {
            Some(CacdError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(CacdError::Conflict(_)) => StatusCode::CONFLICT,
            Some(CacdError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            None if self.0.chain().any(|e| e.is::<ReconcileError>()) => StatusCode::BAD_REQUEST,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_msg = self.0.to_string();
        let details = self.0.chain().skip(1).map(|e| e.to_string()).collect::<Vec<_>>().join(": ");

        if status.is_server_error() {
            tracing::error!(error = %error_msg, details = %details, "Request failed");
        }

        let response = if details.is_empty() {
            ErrorResponse::new(error_msg)
        } else {
            ErrorResponse::with_details(error_msg, details)
        };

        (status, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests;
