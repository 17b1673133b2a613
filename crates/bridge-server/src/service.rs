//! The MCP-facing service: tool catalog and tool invocation.
//!
//! One [`BridgeService`] instance exists per client session; all instances
//! share the same [`Dispatcher`]. Both transports use this handler, so the
//! result envelope is identical whichever endpoint a client connects to.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use openapi_bridge_core::dispatch::Dispatcher;
use openapi_bridge_core::executor::ToolOutcome;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ErrorData as McpError, Implementation,
    ListToolsResult, PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
    Tool,
};
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct BridgeService {
    dispatcher: Arc<Dispatcher>,
    name: String,
    /// When present, tool calls on this session run one at a time.
    dispatch_gate: Option<Arc<Mutex<()>>>,
}

impl BridgeService {
    /// Session handler that dispatches calls as they arrive. Used by the
    /// streamable HTTP transport, where responses are correlated by
    /// JSON-RPC id and may complete out of order.
    pub fn concurrent(dispatcher: Arc<Dispatcher>, name: impl Into<String>) -> Self {
        Self {
            dispatcher,
            name: name.into(),
            dispatch_gate: None,
        }
    }

    /// Session handler that serializes tool calls. Used by the SSE
    /// transport: its single response stream offers no per-response
    /// ordering guarantees worth relying on, so calls complete in arrival
    /// order.
    pub fn serialized(dispatcher: Arc<Dispatcher>, name: impl Into<String>) -> Self {
        Self {
            dispatcher,
            name: name.into(),
            dispatch_gate: Some(Arc::new(Mutex::new(()))),
        }
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some(self.dispatcher.title().to_string()),
                ..Default::default()
            },
            instructions: Some(format!(
                "Each tool relays one HTTP operation of '{}'. Every result carries a \
                 'success' flag: when true, statusCode/headers/body describe the upstream \
                 response (including error statuses); when false, errorMessage says why \
                 the call never completed.",
                self.dispatcher.title()
            )),
        }
    }

    pub fn tool_catalog(&self) -> Vec<Tool> {
        self.dispatcher
            .registry()
            .iter()
            .map(|t| {
                let schema = t
                    .definition
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                Tool::new(
                    t.definition.name.clone(),
                    t.definition.description.clone(),
                    Arc::new(schema),
                )
            })
            .collect()
    }

    /// Run one tool call, honoring the session's dispatch gate.
    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> CallToolResult {
        let outcome = match &self.dispatch_gate {
            Some(gate) => {
                let _serialized = gate.lock().await;
                self.dispatcher.dispatch(name, args).await
            }
            None => self.dispatcher.dispatch(name, args).await,
        };
        outcome_to_result(outcome)
    }
}

impl ServerHandler for BridgeService {
    fn get_info(&self) -> ServerInfo {
        self.server_info()
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_catalog(),
            next_cursor: None,
            meta: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let args = request.arguments.unwrap_or_default();
            Ok(self.invoke(&request.name, &args).await)
        }
    }
}

/// Render an outcome as a `CallToolResult`: a JSON envelope as structured
/// content, the same envelope pretty-printed as text content, and `isError`
/// mirroring the success flag. The executor hands the body over as raw
/// bytes; decoding for presentation happens here.
fn outcome_to_result(outcome: ToolOutcome) -> CallToolResult {
    let success = outcome.success;
    let mut envelope = serde_json::Map::new();
    envelope.insert("success".to_string(), json!(success));
    if let Some(status) = outcome.status {
        envelope.insert("statusCode".to_string(), json!(status));
    }
    if let Some(headers) = outcome.headers {
        envelope.insert("headers".to_string(), Value::Object(headers));
    }
    if let Some(body) = outcome.body {
        envelope.insert("body".to_string(), decode_body(&body));
    }
    if let Some(error) = outcome.error {
        envelope.insert("errorMessage".to_string(), json!(error));
    }
    let envelope = Value::Object(envelope);

    let text = serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| envelope.to_string());
    let mut result = CallToolResult::success(vec![Content::text(text)]);
    result.structured_content = Some(envelope);
    result.is_error = Some(!success);
    result
}

/// JSON if it parses, UTF-8 text otherwise, base64 wrapper as a last resort.
fn decode_body(bytes: &[u8]) -> Value {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return value;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => json!({
            "encoding": "base64",
            "data": BASE64.encode(bytes),
        }),
    }
}
