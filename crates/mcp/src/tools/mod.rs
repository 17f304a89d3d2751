pub mod archive;
pub mod federation;
mod registry;
pub mod rules;
pub mod tasks;

pub use archive::MergePreviewTool;
pub use federation::{
    ExportOriginTool, GetBacklogTool, GetFeedbackTool, GetKnowledgePackageTool, PullKnowledgeTool,
};
pub use registry::{
    json_schema_array, json_schema_integer, json_schema_object, json_schema_string, parse_args,
    Tool, ToolRegistry,
};
pub use rules::UpdateRulesTool;
pub use tasks::{CreateTaskTool, GenerateReportTool, GetContextTool};

use crate::context::McpContext;
use std::sync::Arc;

/// Registry holding every CACD tool
pub fn default_registry(ctx: Arc<McpContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Federation
    registry.register(Arc::new(ExportOriginTool::new(ctx.clone())));
    registry.register(Arc::new(GetBacklogTool::new(ctx.clone())));
    registry.register(Arc::new(GetFeedbackTool::new(ctx.clone())));
    registry.register(Arc::new(PullKnowledgeTool::new(ctx.clone())));
    registry.register(Arc::new(GetKnowledgePackageTool::new(ctx.clone())));

    // Tasks and reports
    registry.register(Arc::new(CreateTaskTool::new(ctx.clone())));
    registry.register(Arc::new(GetContextTool::new(ctx.clone())));
    registry.register(Arc::new(GenerateReportTool));

    registry.register(Arc::new(UpdateRulesTool::new(ctx.clone())));
    registry.register(Arc::new(MergePreviewTool::new(ctx)));

    registry
}
