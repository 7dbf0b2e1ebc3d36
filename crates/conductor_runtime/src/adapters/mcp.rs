//! Tool-invocation adapter for the `mcp` runtime.
//!
//! The transport is an external collaborator; the adapter only shapes the
//! call and wraps the response payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::timeout;

use conductor_protocol::defaults::DEFAULT_ADAPTER_TIMEOUT_SECS;

use super::{ActionAdapter, AdapterCall, AdapterError};

#[derive(Debug, Error)]
#[error("tool transport error: {0}")]
pub struct ToolTransportError(pub String);

/// Remote tool invocation seam.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn call_tool(&self, tool: &str, payload: Value) -> Result<Value, ToolTransportError>;
}

pub struct McpAdapter {
    transport: Arc<dyn ToolTransport>,
    timeout: Duration,
}

impl McpAdapter {
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ActionAdapter for McpAdapter {
    async fn execute(&self, call: AdapterCall<'_>) -> Result<Map<String, Value>, AdapterError> {
        let tool = call.entrypoint.tool.ok_or_else(|| {
            AdapterError::new("invalid_entrypoint", "mcp entrypoint requires tool")
        })?;

        let payload = Value::Object(call.inputs.clone());
        let response = timeout(self.timeout, self.transport.call_tool(tool, payload))
            .await
            .map_err(|_| AdapterError::timeout("mcp"))?
            .map_err(|err| AdapterError::new("tool_call_failed", format!("tool call failed: {err}")))?;

        let mut output = Map::new();
        output.insert("result".to_string(), response);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::super::EntrypointSpec;
    use super::*;
    use conductor_protocol::SkillContext;
    use conductor_registry::{ActionEntry, OpRuntimeEntry};
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::OnceLock;

    struct EchoTransport;

    #[async_trait]
    impl ToolTransport for EchoTransport {
        async fn call_tool(&self, tool: &str, payload: Value) -> Result<Value, ToolTransportError> {
            Ok(json!({"tool": tool, "payload": payload}))
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl ToolTransport for FailingTransport {
        async fn call_tool(&self, _tool: &str, _payload: Value) -> Result<Value, ToolTransportError> {
            Err(ToolTransportError("connection refused".to_string()))
        }
    }

    fn test_entry() -> &'static dyn ActionEntry {
        static ENTRY: OnceLock<OpRuntimeEntry> = OnceLock::new();
        ENTRY.get_or_init(|| {
            let definition: conductor_protocol::OpDefinition = serde_json::from_value(json!({
                "name": "search_web",
                "version": "1.0.0",
                "description": "search",
                "inputs_schema": {"type": "object"},
                "outputs_schema": {"type": "object"},
                "capabilities": ["web.search"],
                "autonomy": "L3",
                "runtime": "mcp",
                "tool": "web_search",
                "failure_modes": [{"code": "search_failed", "description": "search failed"}]
            }))
            .unwrap();
            OpRuntimeEntry {
                status: definition.status,
                autonomy: definition.autonomy,
                rate_limit: None,
                channels: None,
                actors: None,
                definition,
            }
        })
    }

    fn call<'a>(
        tool: Option<&'a str>,
        inputs: &'a Map<String, Value>,
        context: &'a SkillContext,
    ) -> AdapterCall<'a> {
        AdapterCall {
            entry: test_entry(),
            entrypoint: EntrypointSpec {
                runtime: "mcp",
                module: None,
                handler: None,
                url: None,
                command: None,
                tool,
            },
            inputs,
            context,
            invoker: None,
        }
    }

    #[tokio::test]
    async fn test_wraps_transport_response() {
        let adapter = McpAdapter::new(Arc::new(EchoTransport));
        let inputs = json!({"query": "rust"}).as_object().cloned().unwrap();
        let context = SkillContext::new(BTreeSet::new());
        let output = adapter
            .execute(call(Some("web_search"), &inputs, &context))
            .await
            .unwrap();
        assert_eq!(output["result"]["tool"], json!("web_search"));
        assert_eq!(output["result"]["payload"]["query"], json!("rust"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_tool_call_failed() {
        let adapter = McpAdapter::new(Arc::new(FailingTransport));
        let inputs = Map::new();
        let context = SkillContext::new(BTreeSet::new());
        let err = adapter
            .execute(call(Some("web_search"), &inputs, &context))
            .await
            .unwrap_err();
        assert_eq!(err.code, "tool_call_failed");
    }

    #[tokio::test]
    async fn test_missing_tool_is_invalid_entrypoint() {
        let adapter = McpAdapter::new(Arc::new(EchoTransport));
        let inputs = Map::new();
        let context = SkillContext::new(BTreeSet::new());
        let err = adapter.execute(call(None, &inputs, &context)).await.unwrap_err();
        assert_eq!(err.code, "invalid_entrypoint");
    }
}
