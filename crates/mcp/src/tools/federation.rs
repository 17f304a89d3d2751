// Federation drop-box tools

use crate::context::McpContext;
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_object, json_schema_string, parse_args, Tool};
use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct OriginArgs {
    origin: String,
}

#[derive(Debug, Deserialize)]
struct KnowledgeFileArgs {
    origin: String,
    file: String,
}

#[derive(Debug, Deserialize)]
struct KnowledgePackageArgs {
    origin: String,
    name: String,
}

fn origin_schema() -> serde_json::Value {
    json_schema_object(
        json!({ "origin": json_schema_string("Repository origin of the drop-box") }),
        vec!["origin"],
    )
}

/// Zip an origin's drop-box and return the archive path
pub struct ExportOriginTool {
    ctx: Arc<McpContext>,
}

impl ExportOriginTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for ExportOriginTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "export_origin".to_string(),
            description: "Export everything an origin has shared into a zip file and return its path"
                .to_string(),
            input_schema: origin_schema(),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: OriginArgs = parse_args("export_origin", arguments)?;
        let path = self.ctx.federation.export_origin(&args.origin)?;
        Ok(CallToolResult::text(path.display().to_string()))
    }
}

pub struct GetBacklogTool {
    ctx: Arc<McpContext>,
}

impl GetBacklogTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for GetBacklogTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_backlog".to_string(),
            description: "Read the federation backlog of an origin".to_string(),
            input_schema: origin_schema(),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: OriginArgs = parse_args("get_backlog", arguments)?;
        let backlog = self.ctx.federation.backlog(&args.origin)?;
        Ok(CallToolResult::json(&json!({ "origin": args.origin, "backlog": backlog }))?)
    }
}

pub struct GetFeedbackTool {
    ctx: Arc<McpContext>,
}

impl GetFeedbackTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for GetFeedbackTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_feedback".to_string(),
            description: "Read the feedback collected for an origin".to_string(),
            input_schema: origin_schema(),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: OriginArgs = parse_args("get_feedback", arguments)?;
        let feedback = self.ctx.federation.feedback(&args.origin)?;
        Ok(CallToolResult::json(&json!({ "origin": args.origin, "feedback": feedback }))?)
    }
}

/// Raw text of a knowledge package file
pub struct PullKnowledgeTool {
    ctx: Arc<McpContext>,
}

impl PullKnowledgeTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for PullKnowledgeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "federation_pull_knowledge".to_string(),
            description: "Fetch a knowledge file shared by an origin".to_string(),
            input_schema: json_schema_object(
                json!({
                    "origin": json_schema_string("Repository origin of the drop-box"),
                    "file": json_schema_string("File name inside knowledge_packages")
                }),
                vec!["origin", "file"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: KnowledgeFileArgs = parse_args("federation_pull_knowledge", arguments)?;
        let content = self
            .ctx
            .federation
            .knowledge_package(&args.origin, &args.file)?;
        Ok(CallToolResult::text(content))
    }
}

pub struct GetKnowledgePackageTool {
    ctx: Arc<McpContext>,
}

impl GetKnowledgePackageTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for GetKnowledgePackageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_knowledge_package".to_string(),
            description: "Get a knowledge package of an origin by name".to_string(),
            input_schema: json_schema_object(
                json!({
                    "origin": json_schema_string("Repository origin of the drop-box"),
                    "name": json_schema_string("Knowledge package name")
                }),
                vec!["origin", "name"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: KnowledgePackageArgs = parse_args("get_knowledge_package", arguments)?;
        let content = self
            .ctx
            .federation
            .knowledge_package(&args.origin, &args.name)?;
        Ok(CallToolResult::json(&json!({
            "origin": args.origin,
            "name": args.name,
            "content": content,
        }))?)
    }
}
