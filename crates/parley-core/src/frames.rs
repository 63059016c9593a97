//! Wire protocol between the browser UI and the gateway.
//!
//! One JSON frame per WebSocket text message, discriminated on `type`.

use serde::{Deserialize, Serialize};

use crate::model::{McpOperation, ToolDescriptor};

/// Frame sent by the UI.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    Connect,
    Disconnect,
    Message { message: String },
}

/// Frame sent to the UI. Always addressed to the originating connection,
/// never broadcast.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Connected {
        message: String,
    },
    Disconnected {
        message: String,
    },
    Tools {
        tools: Vec<ToolDescriptor>,
    },
    Response {
        message: String,
        #[serde(rename = "mcpOperation", skip_serializing_if = "Option::is_none")]
        operation: Option<McpOperation>,
    },
    Error {
        message: String,
    },
}

impl OutboundFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
