mod client;
mod error;
mod transport;
mod types;

pub use client::McpClient;
pub use error::McpError;
pub use types::McpServerConfig;
