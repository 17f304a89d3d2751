// MDC rule tool

use crate::context::McpContext;
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_array, json_schema_object, json_schema_string, parse_args, Tool};
use anyhow::Result;
use cacd_core::rules::RuleEdit;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct UpdateRulesArgs {
    rules: Vec<RuleEdit>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Create or rewrite MDC rule files; none are written if one is invalid
pub struct UpdateRulesTool {
    ctx: Arc<McpContext>,
}

impl UpdateRulesTool {
    pub fn new(ctx: Arc<McpContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateRulesTool {
    fn schema(&self) -> ToolSchema {
        let rule = json!({
            "type": "object",
            "properties": {
                "meta": {
                    "type": "object",
                    "description": "Frontmatter; description is required"
                },
                "body": json_schema_string("Markdown body"),
                "filename": json_schema_string("Name for a new rule file"),
                "path": json_schema_string("Existing rule file to rewrite")
            },
            "required": ["meta"]
        });
        ToolSchema {
            name: "update_rules".to_string(),
            description: "Create or update MDC rules".to_string(),
            input_schema: json_schema_object(
                json!({
                    "rules": json_schema_array(rule, "Rules to write"),
                    "user_id": json_schema_string("Acting user recorded in the audit log")
                }),
                vec!["rules"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: UpdateRulesArgs = parse_args("update_rules", arguments)?;
        let results = self.ctx.rules.apply(args.rules)?;
        self.ctx.bank.append_audit(
            args.user_id.as_deref(),
            &format!("MDC rules updated: {} file(s)", results.len()),
        )?;
        Ok(CallToolResult::json(&json!({
            "status": "rules updated",
            "count": results.len(),
            "results": results,
        }))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_update_rules_writes_files() {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(McpContext::open(dir.path()).unwrap());
        let tool = UpdateRulesTool::new(ctx.clone());

        let result = tool
            .execute(json!({
                "rules": [{"meta": {"description": "Short names"}, "body": "Keep them short."}],
                "user_id": "dev"
            }))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(result.content[0].as_text()).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(ctx.rules.list().unwrap()[0].path, "Short_names.mdc");

        let invalid = tool
            .execute(json!({"rules": [{"meta": {}, "body": "x"}]}))
            .await;
        assert!(invalid.is_err());
    }
}
