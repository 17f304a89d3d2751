// MCP server: newline-delimited JSON-RPC 2.0 over stdio

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities, ServerInfo,
    ToolsCapability, JSONRPC_VERSION,
};
use crate::tools::ToolRegistry;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "cacd-mcp";

/// Longest accepted request line
const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

pub struct McpServer {
    registry: ToolRegistry,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            initialized: AtomicBool::new(false),
        }
    }

    /// Serve stdin/stdout until the client closes stdin
    pub async fn start(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut out = FramedWrite::new(writer, LinesCodec::new());
        tracing::info!(tools = self.registry.len(), "MCP server ready");

        while let Some(line) = lines.next().await {
            let line = line.context("Failed to read request line")?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let json = serde_json::to_string(&response).context("Failed to encode response")?;
                out.send(json).await.context("Failed to write response")?;
            }
        }

        tracing::info!("Client closed stdin, MCP server stopping");
        Ok(())
    }

    /// Handle one request line; notifications produce no response
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Unparsable request");
                return Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error(e)));
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        tracing::debug!(method = %request.method, "Request");
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "notifications/initialized" => {
                self.initialized.store(true, Ordering::SeqCst);
                tracing::info!("Client initialized");
                Ok(Value::Null)
            }
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        // Notifications never get a reply, not even an error
        let id = request.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = decode_params(params)?;
        tracing::info!(
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            client_protocol = %params.protocol_version,
            "Initialize"
        );

        to_value(&InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        to_value(&ListToolsResult {
            tools: self.registry.list_schemas(),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = decode_params(params)?;
        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let result = match tool.execute(params.arguments).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %format!("{:#}", e), "Tool failed");
                CallToolResult::error(format!("{:#}", e))
            }
        };
        to_value(&result)
    }
}

fn decode_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::McpContext;
    use crate::tools::default_registry;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn server() -> (TempDir, McpServer) {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(McpContext::open(dir.path()).unwrap());
        (dir, McpServer::new(default_registry(ctx)))
    }

    async fn call(server: &McpServer, request: Value) -> JsonRpcResponse {
        server
            .handle_line(&request.to_string())
            .await
            .expect("request expects a response")
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let (_dir, server) = server();
        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test", "version": "0"}
                }
            }),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);

        let ack = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(ack.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (_dir, server) = server();
        let response = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        let result = response.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "create_task",
                "export_origin",
                "federation_pull_knowledge",
                "generate_report",
                "get_backlog",
                "get_context",
                "get_feedback",
                "get_knowledge_package",
                "merge_preview",
                "update_rules",
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_errors_are_results() {
        let (_dir, server) = server();
        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "get_context", "arguments": {"task_id": "missing"}}
            }),
        )
        .await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["isError"], true);

        let unknown = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "nope", "arguments": {}}
            }),
        )
        .await;
        assert_eq!(unknown.error.unwrap().code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let (_dir, server) = server();
        let parse = server.handle_line("{not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, JsonRpcError::PARSE_ERROR);

        let missing = call(&server, json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"})).await;
        assert_eq!(missing.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);

        let version = call(&server, json!({"jsonrpc": "1.0", "id": 6, "method": "ping"})).await;
        assert_eq!(version.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_serve_over_streams() {
        let (_dir, server) = server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"generate_report","arguments":{"context":{"task_id":"t1","summary":"done"}}}}"#,
            "\n",
        );
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(
            responses[1]["result"]["content"][0]["text"],
            "Report for task t1: done"
        );
    }
}
