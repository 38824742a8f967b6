//! Agent Payment Router MCP Server
//!
//! Speaks JSON-RPC 2.0 over stdio to an AI assistant and relays `tools/list`
//! and `tools/call` to the upstream products API. Requests are handled one at
//! a time in arrival order, so the name registry needs no locking.

use super::names::NameRegistry;
use super::protocol::{
    McpTool, Method, RpcError, RpcRequest, RpcResponse, ToolCallResult, PROTOCOL_VERSION,
    SERVER_NAME,
};
use super::transport::{write_line, LineReader};
use crate::api::{ApiClient, ExecutionRequest, ToolBackend};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{ApiError, Result};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

/// Run the relay on the process's stdin/stdout until input closes or
/// `shutdown` is cancelled.
pub async fn run(config: &Config, shutdown: CancellationToken) -> Result<()> {
    let client = ApiClient::new(&config.api_url, &config.api_key, &config.budget_key)?;
    tracing::info!(api_url = %client.base_url(), "MCP server ready, listening on stdio");

    let mut server = McpServer::new(client, shutdown);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    server.serve(stdin, stdout).await
}

pub struct McpServer<B> {
    backend: B,
    names: NameRegistry,
    shutdown: CancellationToken,
}

impl<B: ToolBackend> McpServer<B> {
    pub fn new(backend: B, shutdown: CancellationToken) -> Self {
        Self {
            backend,
            names: NameRegistry::new(),
            shutdown,
        }
    }

    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    /// Transport loop: one request per line in, one response per line out.
    ///
    /// Lines that are not valid JSON-RPC requests are dropped without a
    /// response. Returns `Ok` at end of input or on shutdown, and an error
    /// only for read/write failures or an oversized line.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = LineReader::new(reader);

        loop {
            let line = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping transport loop");
                    break;
                },
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                tracing::info!("Input closed, MCP server shutting down");
                break;
            };
            if line.trim_ascii().is_empty() {
                continue;
            }

            let request = match serde_json::from_slice::<RpcRequest>(&line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!("Error parsing request, skipping line: {}", e);
                    continue;
                },
            };

            if let Some(response) = self.handle_request(request).await {
                let encoded = serde_json::to_vec(&response)?;
                write_line(&mut writer, &encoded).await?;
            }
        }

        Ok(())
    }

    /// Dispatch one request. Notifications produce `None`.
    pub async fn handle_request(&mut self, request: RpcRequest) -> Option<RpcResponse> {
        crate::log_mcp_operation!("dispatch", request.method.as_str());

        let result = match Method::parse(&request.method) {
            Method::Initialize => Ok(handle_initialize()),
            Method::Ping => Ok(json!({})),
            Method::ToolsList => self.handle_tools_list().await,
            Method::ToolsCall => self.handle_tool_call(request.params_object()).await,
            Method::ResourcesList => Ok(json!({ "resources": [] })),
            Method::Notification(name) => {
                handle_notification(name);
                return None;
            },
            Method::Unknown(name) => {
                tracing::warn!("Unknown method: {}", name);
                Err(RpcError::method_not_found(name))
            },
        };

        Some(match result {
            Ok(value) => RpcResponse::success(request.id, value),
            Err(error) => RpcResponse::failure(request.id, error),
        })
    }

    async fn handle_tools_list(&mut self) -> std::result::Result<Value, RpcError> {
        let cancel = self.shutdown.child_token();
        let tools = self.backend.fetch_tools(&cancel).await.map_err(|e| {
            crate::log_error!(e, "tools/list");
            RpcError::internal(format!("failed to fetch tools: {}", e))
        })?;
        tracing::info!("Fetched {} tools from API", tools.len());

        let names = self.names.register_catalog(&tools);
        tracing::info!("Mapped {} tools with readable names", self.names.len());

        let listed: Vec<McpTool> = tools
            .into_iter()
            .zip(names)
            .map(|(tool, name)| McpTool {
                name,
                description: tool.description,
                input_schema: input_schema(tool.parameters),
            })
            .collect();

        Ok(json!({ "tools": listed }))
    }

    async fn handle_tool_call(
        &mut self,
        params: Map<String, Value>,
    ) -> std::result::Result<Value, RpcError> {
        let public_name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("missing or invalid 'name' parameter"))?;

        let product_id = match self.names.resolve(public_name) {
            Some(id) => id.to_string(),
            None => {
                tracing::warn!(
                    "Tool '{}' not found in name mapping, using it as the product id",
                    public_name
                );
                public_name.to_string()
            },
        };

        let arguments = match params.get("arguments") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => json!({}),
        };
        let streaming = arguments
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let request = ExecutionRequest::new(product_id, arguments);
        tracing::info!(
            tool = public_name,
            product_id = %request.product_id,
            streaming,
            "Tool call"
        );

        let cancel = self.shutdown.child_token();
        let outcome = if streaming {
            self.execute_streaming(&request, &cancel).await
        } else {
            self.backend.purchase(&request, &cancel).await
        };

        let result = match outcome {
            Ok(output) => {
                tracing::info!(chars = output.len(), "Purchase completed successfully");
                ToolCallResult::success(output)
            },
            Err(e) => {
                tracing::warn!(tool = public_name, "Purchase failed: {}", e);
                ToolCallResult::error(e)
            },
        };

        serde_json::to_value(result)
            .map_err(|e| RpcError::internal(format!("Serialization error: {}", e)))
    }

    /// Collect a streamed execution into one text block.
    async fn execute_streaming(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, ApiError> {
        let (sink, mut chunks) = mpsc::unbounded_channel();
        let outcome = self.backend.stream_purchase(request, cancel, sink).await;

        let mut output = String::new();
        let mut count = 0usize;
        while let Ok(chunk) = chunks.try_recv() {
            output.push_str(&chunk);
            count += 1;
        }
        tracing::debug!(chunks = count, chars = output.len(), "Stream drained");

        outcome.map(|()| output)
    }
}

fn handle_initialize() -> Value {
    tracing::info!("Initialize request from client");
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": true
            }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn handle_notification(method: &str) {
    match method {
        "notifications/initialized" => tracing::info!("MCP client initialized"),
        "notifications/cancelled" => tracing::debug!("Client cancelled a request"),
        other => tracing::debug!("Notification: {}", other),
    }
}

/// Upstream schemas pass through untouched; a missing one becomes an empty
/// object schema so clients always get something to validate against.
fn input_schema(parameters: Value) -> Value {
    if parameters.is_null() {
        json!({ "type": "object" })
    } else {
        parameters
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
