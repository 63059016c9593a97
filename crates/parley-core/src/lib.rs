pub mod errors;
pub mod frames;
pub mod ids;
pub mod model;

pub use errors::ChatError;
pub use frames::{InboundFrame, OutboundFrame};
pub use model::{ChatMessage, McpOperation, Role, ToolDescriptor};
