//! The seam between the session bridge and the backend process client.
//!
//! The bridge and router are written against `BackendSession` so the state
//! machine and intent precedence are testable without spawning a process.

use async_trait::async_trait;
use serde_json::{Map, Value};

use parley_core::model::ToolDescriptor;
use parley_core::ChatError;
use parley_mcp::{McpClient, McpError};

#[async_trait]
pub trait BackendSession: Send {
    async fn connect(&mut self) -> Result<(), ChatError>;
    async fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn tools(&self) -> Result<Vec<ToolDescriptor>, ChatError>;
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, ChatError>;
    async fn read_resource(&mut self, uri: &str) -> Result<String, ChatError>;
}

#[async_trait]
impl BackendSession for McpClient {
    async fn connect(&mut self) -> Result<(), ChatError> {
        McpClient::connect(self)
            .await
            .map_err(|e| ChatError::Connection(e.to_string()))
    }

    async fn disconnect(&mut self) {
        McpClient::disconnect(self).await;
    }

    fn is_connected(&self) -> bool {
        McpClient::is_connected(self)
    }

    fn tools(&self) -> Result<Vec<ToolDescriptor>, ChatError> {
        McpClient::tools(self)
            .map(|tools| tools.to_vec())
            .map_err(call_error)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, ChatError> {
        McpClient::call_tool(self, name, arguments)
            .await
            .map_err(call_error)
    }

    async fn read_resource(&mut self, uri: &str) -> Result<String, ChatError> {
        McpClient::read_resource(self, uri).await.map_err(call_error)
    }
}

fn call_error(e: McpError) -> ChatError {
    match e {
        McpError::NotConnected => ChatError::NotConnected,
        other => ChatError::Invocation(other.to_string()),
    }
}
