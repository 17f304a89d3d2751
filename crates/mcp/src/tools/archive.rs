// Archive reconciliation preview

use crate::context::McpContext;
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_integer, json_schema_object, json_schema_string, parse_args, Tool};
use anyhow::{Context, Result};
use cacd_core::ProjectId;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct MergePreviewArgs {
    project_id: ProjectId,
    archive_path: PathBuf,
}

/// Dry-run reconciliation of an archive file against a project
pub struct MergePreviewTool {
    ctx: Arc<McpContext>,
}

impl MergePreviewTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for MergePreviewTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "merge_preview".to_string(),
            description: "Show what merging a project archive would add, update or skip"
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "project_id": json_schema_integer("Target project"),
                    "archive_path": json_schema_string("Path of the project archive zip")
                }),
                vec!["project_id", "archive_path"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: MergePreviewArgs = parse_args("merge_preview", arguments)?;
        let bytes = tokio::fs::read(&args.archive_path)
            .await
            .with_context(|| format!("Failed to read {}", args.archive_path.display()))?;
        let report = self.ctx.archive.preview_merge(args.project_id, &bytes)?;
        Ok(CallToolResult::json(&json!({
            "project_id": report.project_id,
            "noop": report.is_noop(),
            "summary": report.summary(),
            "diff": report.diff,
        }))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cacd_core::projects;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_preview_of_own_export_is_noop() {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(McpContext::open(dir.path()).unwrap());
        let project =
            projects::create_project(&ctx.store, &ctx.hub, "alpha", None, "git@alpha", None)
                .unwrap();
        let exported = ctx.archive.export(project.id, None).await.unwrap();

        let result = MergePreviewTool::new(ctx)
            .execute(json!({
                "project_id": project.id,
                "archive_path": exported.path,
            }))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(result.content[0].as_text()).unwrap();
        assert_eq!(body["noop"], true);
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("empty.zip");
        std::fs::write(&archive, cacd_core::archive::bundle::write_zip(Vec::new()).unwrap()).unwrap();
        let ctx = Arc::new(McpContext::open(&dir.path().join("data")).unwrap());

        let result = MergePreviewTool::new(ctx)
            .execute(json!({"project_id": 42, "archive_path": archive}))
            .await;
        assert!(result.is_err());
    }
}
