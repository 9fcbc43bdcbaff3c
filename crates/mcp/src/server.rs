// MCP server: answers protocol requests for one session

use crate::dispatcher::ToolDispatcher;
use crate::protocol::{
    negotiate_protocol_version, CallToolParams, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolsCapability,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Per-request values resolved by the HTTP layer.
///
/// Also collects the tools actually handed to the collaborator while the
/// request is processed, so the caller can count them afterwards.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Collaborator API key after precedence resolution.
    pub api_key: Option<String>,
    dispatched: Arc<Mutex<Vec<String>>>,
}

impl RequestContext {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            ..Default::default()
        }
    }

    fn record_dispatch(&self, tool: &str) {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tool.to_string());
    }

    /// Names of the tools invoked so far, in call order.
    pub fn dispatched_tools(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct McpServer {
    dispatcher: ToolDispatcher,
    server_info: ServerInfo,
}

impl McpServer {
    pub fn new(dispatcher: ToolDispatcher, server_info: ServerInfo) -> Self {
        Self {
            dispatcher,
            server_info,
        }
    }

    /// Answer an `initialize` request.
    pub fn initialize(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        let params: InitializeParams = match parse_params(request) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::error(id, e),
        };

        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %params.protocol_version,
            "Client initializing"
        );

        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&params.protocol_version).to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                logging: serde_json::json!({}),
            },
            server_info: self.server_info.clone(),
        };

        respond(id, &result)
    }

    /// Answer any request other than `initialize`.
    pub async fn handle_request(
        &self,
        request: &JsonRpcRequest,
        ctx: &RequestContext,
    ) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => respond(
                id,
                &ListToolsResult {
                    tools: self.dispatcher.list(),
                },
            ),
            "tools/call" => {
                let params: CallToolParams = match parse_params(request) {
                    Ok(params) => params,
                    Err(e) => return JsonRpcResponse::error(id, e),
                };

                match self
                    .dispatcher
                    .call(&params.name, params.arguments, ctx.api_key.as_deref())
                    .await
                {
                    Ok(result) => {
                        ctx.record_dispatch(&params.name);
                        respond(id, &result)
                    }
                    Err(e) => JsonRpcResponse::error(id, e.into()),
                }
            }
            method => {
                tracing::debug!(method, "Unsupported method");
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(method))
            }
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    request: &JsonRpcRequest,
) -> Result<T, JsonRpcError> {
    let params = request.params.clone().unwrap_or(Value::Null);
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn respond(id: Value, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}
