/// Typed error hierarchy for the chat bridge.
///
/// `NotConnected` and `Invocation` are converted to user-visible reply text
/// inside the intent router; `Connection` and `Protocol` surface as `error`
/// frames on the wire. None of these are fatal to the gateway process.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Failed to connect to MCP server: {0}")]
    Connection(String),

    #[error("Not connected to MCP server")]
    NotConnected,

    #[error("{0}")]
    Invocation(String),

    #[error("Malformed frame: {0}")]
    Protocol(String),
}

impl ChatError {
    /// True for errors the router swallows into reply text rather than
    /// surfacing as an `error` frame.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Invocation(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::NotConnected => "not_connected",
            Self::Invocation(_) => "invocation",
            Self::Protocol(_) => "protocol",
        }
    }
}
