// Task, context and report tools

use crate::context::McpContext;
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_integer, json_schema_object, json_schema_string, parse_args, Tool};
use anyhow::Result;
use cacd_core::tasks::{self, NewTask};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct CreateTaskArgs {
    #[serde(flatten)]
    task: NewTask,
    #[serde(default)]
    user_id: Option<String>,
}

/// Create a pending task; the scope's priority rules are attached
pub struct CreateTaskTool {
    ctx: Arc<McpContext>,
}

impl CreateTaskTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for CreateTaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_task".to_string(),
            description: "Create a task from a command".to_string(),
            input_schema: json_schema_object(
                json!({
                    "task_id": json_schema_string("Task identifier"),
                    "command": json_schema_string("Command the task runs"),
                    "project_id": json_schema_integer("Project scope; omit for a global task"),
                    "context": json_schema_string("Context saved when the task has none yet"),
                    "user_id": json_schema_string("Acting user recorded in history")
                }),
                vec!["task_id", "command"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: CreateTaskArgs = parse_args("create_task", arguments)?;
        let task = self
            .ctx
            .tasks
            .process_command(args.task, args.user_id.as_deref())?;
        Ok(CallToolResult::json(&task)?)
    }
}

#[derive(Debug, Deserialize)]
struct GetContextArgs {
    task_id: String,
}

pub struct GetContextTool {
    ctx: Arc<McpContext>,
}

impl GetContextTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for GetContextTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_context".to_string(),
            description: "Get the saved context of a task".to_string(),
            input_schema: json_schema_object(
                json!({ "task_id": json_schema_string("Task identifier") }),
                vec!["task_id"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GetContextArgs = parse_args("get_context", arguments)?;
        let entry = self.ctx.tasks.get_context(&args.task_id)?;
        Ok(CallToolResult::json(&entry)?)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateReportArgs {
    #[serde(default)]
    context: serde_json::Value,
}

pub struct GenerateReportTool;

#[async_trait::async_trait]
impl Tool for GenerateReportTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "generate_report".to_string(),
            description: "Render a one-line task report from a context object".to_string(),
            input_schema: json_schema_object(
                json!({
                    "context": {
                        "type": "object",
                        "description": "Object with task_id and summary"
                    }
                }),
                vec!["context"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GenerateReportArgs = parse_args("generate_report", arguments)?;
        Ok(CallToolResult::text(tasks::generate_report(&args.context)))
    }
}
