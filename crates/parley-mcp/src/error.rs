use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn backend process '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("backend handshake failed: {0}")]
    Handshake(String),

    #[error("failed to serialize JSON-RPC message: {0}")]
    Serialization(String),

    #[error("JSON-RPC timeout calling '{method}'")]
    Timeout { method: String },

    #[error("backend transport closed")]
    TransportClosed,

    #[error("backend protocol error ({code}): {message}")]
    Protocol { code: i64, message: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("tool reported failure: {0}")]
    ToolFailed(String),

    #[error("not connected to backend")]
    NotConnected,
}
