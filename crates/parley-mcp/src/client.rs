//! Call-level client for the tool-providing backend process.
//!
//! Owns exactly one live connection. `connect` spawns the process, runs the
//! handshake, and fills the tool cache; `disconnect` tears the process down
//! and is safe to call at any time.

use std::time::Duration;

use serde_json::{json, Map, Value};

use parley_core::model::ToolDescriptor;

use crate::error::McpError;
use crate::transport::McpConnection;
use crate::types::McpServerConfig;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);

pub struct McpClient {
    config: McpServerConfig,
    rpc_timeout: Duration,
    connection: Option<McpConnection>,
    tools: Vec<ToolDescriptor>,
}

impl McpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            connection: None,
            tools: Vec::new(),
        }
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Spawn the backend process, run the handshake, and cache its tools.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        if self.connection.is_some() {
            tracing::debug!("connect called while already connected");
            return Ok(());
        }

        let mut connection = McpConnection::spawn(&self.config).await?;

        if let Err(e) = connection.initialize(self.rpc_timeout).await {
            connection.shutdown().await;
            return Err(e);
        }

        let tools = match list_tools(&mut connection, self.rpc_timeout).await {
            Ok(tools) => tools,
            Err(e) => {
                connection.shutdown().await;
                return Err(e);
            }
        };

        tracing::info!(
            command = %self.config.command,
            tool_count = tools.len(),
            "connected to backend"
        );

        self.connection = Some(connection);
        self.tools = tools;
        Ok(())
    }

    /// Terminate the backend process and clear the tool cache. Idempotent;
    /// teardown failures are logged since the caller has no recovery action.
    pub async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.shutdown().await;
            tracing::info!(command = %self.config.command, "disconnected from backend");
        }
        self.tools.clear();
    }

    /// The tools advertised by the backend during the current connected
    /// period.
    pub fn tools(&self) -> Result<&[ToolDescriptor], McpError> {
        if self.connection.is_none() {
            return Err(McpError::NotConnected);
        }
        Ok(&self.tools)
    }

    /// Invoke a named tool with a key-value argument mapping and return its
    /// textual result.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, McpError> {
        let connection = self.connection.as_mut().ok_or(McpError::NotConnected)?;
        let params = json!({"name": name, "arguments": arguments});
        let result = connection
            .request("tools/call", Some(params), self.rpc_timeout)
            .await?;
        parse_tool_result(&result)
    }

    /// Resolve a URI-addressed resource to its textual content.
    pub async fn read_resource(&mut self, uri: &str) -> Result<String, McpError> {
        let connection = self.connection.as_mut().ok_or(McpError::NotConnected)?;
        let result = connection
            .request("resources/read", Some(json!({"uri": uri})), self.rpc_timeout)
            .await?;
        parse_resource_result(&result)
    }
}

async fn list_tools(
    connection: &mut McpConnection,
    timeout: Duration,
) -> Result<Vec<ToolDescriptor>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let params = match &cursor {
            Some(c) => json!({"cursor": c}),
            None => json!({}),
        };

        let result = connection.request("tools/list", Some(params), timeout).await?;
        tools.extend(parse_tool_descriptors(&result)?);

        cursor = result
            .get("nextCursor")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        if cursor.is_none() {
            break;
        }
    }

    Ok(tools)
}

fn parse_tool_descriptors(result: &Value) -> Result<Vec<ToolDescriptor>, McpError> {
    let raw_tools = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| McpError::InvalidResponse("tools/list response missing tools".to_string()))?;

    let mut tools = Vec::with_capacity(raw_tools.len());
    for tool in raw_tools {
        let name = tool
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidResponse("tool missing name".to_string()))?
            .to_string();
        let description = tool
            .get("description")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        tools.push(ToolDescriptor { name, description });
    }
    Ok(tools)
}

/// Extract the first text content block from a `tools/call` result, turning
/// `isError` results into a tool failure carrying the backend's message.
fn parse_tool_result(result: &Value) -> Result<String, McpError> {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str);

    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_error {
        return Err(McpError::ToolFailed(
            text.unwrap_or("tool returned an error").to_string(),
        ));
    }

    text.map(|s| s.to_string())
        .ok_or_else(|| McpError::InvalidResponse("tool result has no text content".to_string()))
}

/// Extract the first text item from a `resources/read` result.
fn parse_resource_result(result: &Value) -> Result<String, McpError> {
    result
        .get("contents")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| McpError::InvalidResponse("resource has no text content".to_string()))
}
