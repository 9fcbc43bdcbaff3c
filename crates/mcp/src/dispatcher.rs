// Tool dispatch: resolve `tools/call` to the search collaborator

use crate::error::DispatchError;
use crate::protocol::{CallToolResult, ToolSchema};
use exa_gateway_core::backend::SearchBackend;
use exa_gateway_core::tools::{ToolId, ToolPolicy, ToolRequest};
use std::sync::Arc;

/// Per-session dispatcher built from the process-wide tool policy.
#[derive(Clone)]
pub struct ToolDispatcher {
    policy: ToolPolicy,
    backend: Arc<dyn SearchBackend>,
}

impl ToolDispatcher {
    pub fn new(policy: ToolPolicy, backend: Arc<dyn SearchBackend>) -> Self {
        Self { policy, backend }
    }

    /// Resolve a protocol tool name; disabled tools do not exist for the caller.
    pub fn resolve(&self, name: &str) -> Result<ToolId, DispatchError> {
        ToolId::from_name(name)
            .filter(|id| self.policy.is_enabled(*id))
            .ok_or_else(|| DispatchError::ToolNotFound(name.to_string()))
    }

    /// Schemas of the enabled tools, in catalogue order.
    pub fn list(&self) -> Vec<ToolSchema> {
        self.policy
            .enabled()
            .map(|id| {
                let registration = id.registration();
                ToolSchema {
                    name: id.as_str().to_string(),
                    title: Some(registration.display_name.to_string()),
                    description: registration.description.to_string(),
                    input_schema: id.input_schema(),
                }
            })
            .collect()
    }

    /// Run one tool call.
    ///
    /// Unknown tools and malformed arguments are `Err`; collaborator failures
    /// come back as an `isError` result so the session keeps going.
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
        api_key: Option<&str>,
    ) -> Result<CallToolResult, DispatchError> {
        let tool = self.resolve(name)?;
        let request =
            ToolRequest::parse(tool, arguments).map_err(|e| DispatchError::InvalidArguments {
                tool: name.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(tool = %tool, "Dispatching tool call");

        match self.backend.call(request, api_key).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result)
                    .unwrap_or_else(|_| result.to_string());
                Ok(CallToolResult::text(text))
            }
            Err(e) => {
                tracing::warn!(tool = %tool, error = %e, "Tool call failed upstream");
                Ok(CallToolResult::error(format!("{} failed: {}", tool, e)))
            }
        }
    }
}
