//! MCP server exposing `remediate` and `circuit_status`.

use std::sync::Arc;

use circuit_breaker::CircuitBreakerFactory;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::protocol::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::domain::RemediateDomain;
use crate::entities::{OutputStatus, RemediateInput, MAX_ISSUE_CHARS};
use crate::errors::RemediateError;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP server state
pub struct McpServer {
    domain: RemediateDomain,
    breakers: Arc<CircuitBreakerFactory>,
}

impl McpServer {
    pub fn new(domain: RemediateDomain, breakers: Arc<CircuitBreakerFactory>) -> Self {
        Self { domain, breakers }
    }

    /// Serve newline-delimited JSON-RPC until `reader` reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) => self.handle_request(&request).await,
                Err(e) => Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                )),
            };

            if let Some(response) = response {
                let mut encoded = serde_json::to_string(&response)?;
                encoded.push('\n');
                writer.write_all(encoded.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    /// Handle one request. Notifications produce no response.
    pub async fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        let response = match request.method.as_str() {
            "initialize" => Self::handle_initialize(id),
            "tools/list" => Self::handle_tools_list(id),
            "tools/call" => self.handle_tool_call(id, request.params.as_ref()).await,
            "ping" => JsonRpcResponse::success(id, json!({})),
            _ => JsonRpcResponse::error(id, METHOD_NOT_FOUND, "Method not found"),
        };
        Some(response)
    }

    fn handle_initialize(id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "remediate-mcp",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(id: Value) -> JsonRpcResponse {
        let tools = json!({
            "tools": [
                {
                    "name": "remediate",
                    "description": "Investigate a Kubernetes issue with read-only cluster queries and propose a remediation",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "issue": {
                                "type": "string",
                                "description": format!("Description of the issue (1-{MAX_ISSUE_CHARS} characters)")
                            },
                            "context": {
                                "type": "object",
                                "description": "Optional event, logs, metrics, podSpec and relatedEvents"
                            },
                            "mode": {
                                "type": "string",
                                "enum": ["manual", "automatic"],
                                "description": "Execution mode (default: manual)"
                            },
                            "policy": {
                                "type": "string",
                                "description": "Constraints the remediation must respect"
                            },
                            "confidenceThreshold": {
                                "type": "number",
                                "description": "Minimum confidence for automatic execution (default: 0.8)"
                            },
                            "maxRiskLevel": {
                                "type": "string",
                                "enum": ["low", "medium", "high"],
                                "description": "Highest risk allowed for automatic execution (default: low)"
                            },
                            "sessionId": {
                                "type": "string",
                                "description": "Return the stored result of an earlier investigation"
                            }
                        }
                    }
                },
                {
                    "name": "circuit_status",
                    "description": "Report the state of every circuit breaker",
                    "inputSchema": {
                        "type": "object",
                        "properties": {}
                    }
                }
            ]
        });
        JsonRpcResponse::success(id, tools)
    }

    async fn handle_tool_call(&self, id: Value, params: Option<&Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params");
        };

        let tool_name = params.get("name").and_then(Value::as_str).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let (body, is_error) = match tool_name {
            "remediate" => self.tool_remediate(arguments).await,
            "circuit_status" => (self.tool_circuit_status(), false),
            _ => (
                failure_body(&RemediateError::InvalidInput(format!(
                    "Unknown tool: {tool_name}"
                ))),
                true,
            ),
        };

        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
        let mut result = json!({
            "content": [{
                "type": "text",
                "text": text
            }]
        });
        if is_error {
            result["isError"] = Value::Bool(true);
        }
        JsonRpcResponse::success(id, result)
    }

    async fn tool_remediate(&self, arguments: Value) -> (Value, bool) {
        let input: RemediateInput = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(e) => {
                let err = RemediateError::InvalidInput(format!("invalid arguments: {e}"));
                return (failure_body(&err), true);
            }
        };

        match self.domain.remediate(input).await {
            Ok(output) => {
                let failed = output.status == OutputStatus::Failed;
                match serde_json::to_value(&output) {
                    Ok(body) => (body, failed),
                    Err(e) => (failure_body(&RemediateError::Json(e)), true),
                }
            }
            Err(err) => {
                warn!(error = %err, "remediate failed");
                (failure_body(&err), true)
            }
        }
    }

    fn tool_circuit_status(&self) -> Value {
        json!({ "circuits": self.breakers.all_stats() })
    }
}

/// `{status: "failed", error, ...}` body for a tool error.
fn failure_body(err: &RemediateError) -> Value {
    let mut body = Map::new();
    body.insert("status".to_string(), json!("failed"));
    body.insert("error".to_string(), json!(err.to_string()));
    if let Some(session_id) = err.session_id() {
        body.insert("sessionId".to_string(), json!(session_id));
    }
    if let Some(open) = err.circuit_open() {
        body.insert("circuitName".to_string(), json!(open.circuit_name));
        body.insert(
            "remainingCooldownMs".to_string(),
            json!(open.remaining_cooldown_ms),
        );
    }
    Value::Object(body)
}
