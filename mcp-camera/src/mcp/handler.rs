//! JSON-RPC method dispatch shared by every transport.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::tools::CameraTools;
use super::types::{
    CallToolParams, Implementation, InitializeParams, InitializeResult, JSONRPC_VERSION,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities, ToolsCapability,
};
use crate::config::ServerInfo;

/// Transport-independent MCP request handler.
#[derive(Clone)]
pub struct McpHandler {
    tools: CameraTools,
    info: ServerInfo,
}

impl McpHandler {
    pub fn new(tools: CameraTools, info: ServerInfo) -> Self {
        Self { tools, info }
    }

    pub fn tools(&self) -> &CameraTools {
        &self.tools
    }

    /// Handle one raw message. Returns `None` when no response is due.
    pub async fn handle_text(&self, raw: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Unparseable JSON-RPC message");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::parse_error(format!("Parse error: {e}")),
                ));
            }
        };
        self.handle_value(value).await
    }

    /// Handle one decoded message.
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::invalid_request(format!("Invalid request: {e}")),
                ));
            }
        };
        self.handle(request).await
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return request.id.map(|id| {
                JsonRpcResponse::failure(
                    id,
                    JsonRpcError::invalid_request(format!(
                        "Unsupported jsonrpc version: {}",
                        request.jsonrpc
                    )),
                )
            });
        }

        let outcome = self.dispatch(&request.method, request.params).await;

        let Some(id) = request.id else {
            if let Err(e) = outcome {
                debug!(method = %request.method, error = %e.message, "Notification failed");
            }
            return None;
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => to_value(self.initialize(params)?),
            "notifications/initialized" | "notifications/cancelled" => Ok(Value::Null),
            "ping" => Ok(Value::Object(Default::default())),
            "tools/list" => to_value(serde_json::json!({ "tools": CameraTools::definitions() })),
            "tools/call" => {
                let params: CallToolParams = parse_params(params)?;
                to_value(self.tools.call(&params.name, params.arguments).await?)
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<InitializeResult, JsonRpcError> {
        let params: InitializeParams = match params {
            Some(params) => parse_params(Some(params))?,
            None => InitializeParams::default(),
        };

        let protocol_version = negotiate_protocol_version(params.protocol_version.as_deref());
        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                client_version = %client.version,
                protocol = protocol_version,
                "MCP client initialized"
            );
        }

        Ok(InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: Implementation {
                name: self.info.name.clone(),
                version: self.info.version.clone(),
            },
        })
    }
}

/// Echo the client's revision when supported, otherwise offer the newest.
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|s| **s == v))
        .copied()
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal(e.to_string()))
}
