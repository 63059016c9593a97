//! Per-UI-connection session bridge.
//!
//! Owns one backend session client, translates inbound frames into backend
//! calls, and reflects results and connection-state transitions back as
//! outbound frames. Callers must feed it frames one at a time, in arrival
//! order; that sequencing is what keeps a `disconnect` queued behind a
//! pending `connect`.

use parley_core::frames::{InboundFrame, OutboundFrame};
use parley_core::ids::SessionId;
use parley_core::model::ChatMessage;
use parley_core::ChatError;

use crate::backend::BackendSession;
use crate::router;
use crate::state::ConnectionState;

const CONNECTED_MESSAGE: &str = "Connected to MCP server successfully!";
const DISCONNECTED_MESSAGE: &str = "Disconnected from MCP server";

pub struct SessionBridge {
    id: SessionId,
    backend: Box<dyn BackendSession>,
    state: ConnectionState,
    log: Vec<ChatMessage>,
}

impl SessionBridge {
    pub fn new(backend: Box<dyn BackendSession>) -> Self {
        Self {
            id: SessionId::new(),
            backend,
            state: ConnectionState::Disconnected,
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The session's append-only message log.
    pub fn history(&self) -> &[ChatMessage] {
        &self.log
    }

    /// Dispatch one inbound frame and return the frames to send back.
    pub async fn handle_frame(&mut self, frame: InboundFrame) -> Vec<OutboundFrame> {
        match frame {
            InboundFrame::Connect => self.handle_connect().await,
            InboundFrame::Disconnect => self.handle_disconnect().await,
            InboundFrame::Message { message } => self.handle_message(&message).await,
        }
    }

    pub async fn handle_connect(&mut self) -> Vec<OutboundFrame> {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(session_id = %self.id, state = %self.state, "ignoring connect request");
            return Vec::new();
        }

        self.state = ConnectionState::Connecting;
        match self.backend.connect().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                let tools = self.backend.tools().unwrap_or_default();
                self.log.push(ChatMessage::system(CONNECTED_MESSAGE));
                vec![
                    OutboundFrame::Connected {
                        message: CONNECTED_MESSAGE.to_string(),
                    },
                    OutboundFrame::Tools { tools },
                ]
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                tracing::warn!(session_id = %self.id, error = %e, "backend connect failed");
                vec![OutboundFrame::error(e.to_string())]
            }
        }
    }

    pub async fn handle_disconnect(&mut self) -> Vec<OutboundFrame> {
        if self.state == ConnectionState::Disconnected {
            return Vec::new();
        }

        self.state = ConnectionState::Disconnecting;
        self.backend.disconnect().await;
        self.state = ConnectionState::Disconnected;
        self.log.push(ChatMessage::system(DISCONNECTED_MESSAGE));
        vec![OutboundFrame::Disconnected {
            message: DISCONNECTED_MESSAGE.to_string(),
        }]
    }

    pub async fn handle_message(&mut self, text: &str) -> Vec<OutboundFrame> {
        if self.state != ConnectionState::Connected {
            return vec![OutboundFrame::error(ChatError::NotConnected.to_string())];
        }

        self.log.push(ChatMessage::user(text));
        let reply = router::route(text, self.backend.as_mut()).await;
        self.log.push(ChatMessage::assistant(
            reply.message.as_str(),
            reply.operation.clone(),
        ));

        vec![OutboundFrame::Response {
            message: reply.message,
            operation: reply.operation,
        }]
    }

    /// Silent teardown when the UI connection goes away. Emits nothing; the
    /// backend process dies with the session.
    pub async fn shutdown(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.backend.disconnect().await;
            self.state = ConnectionState::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::MockBackend;
    use parley_core::model::{McpOperation, Role};

    fn bridge() -> SessionBridge {
        SessionBridge::new(Box::new(MockBackend::new()))
    }

    #[tokio::test]
    async fn connect_emits_connected_then_tools() {
        let mut bridge = bridge();
        let frames = bridge.handle_connect().await;

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], OutboundFrame::Connected { .. }));
        match &frames[1] {
            OutboundFrame::Tools { tools } => {
                let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
                assert_eq!(names, vec!["add", "subtract"]);
            }
            other => panic!("expected tools frame, got {other:?}"),
        }
        assert_eq!(bridge.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn duplicate_connect_is_ignored() {
        let mut bridge = bridge();
        let first = bridge.handle_connect().await;
        assert_eq!(first.len(), 2);

        let second = bridge.handle_connect().await;
        assert!(second.is_empty());
        assert_eq!(bridge.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn failed_connect_reverts_to_disconnected() {
        let mut bridge = SessionBridge::new(Box::new(MockBackend::failing_connect("spawn failed")));
        let frames = bridge.handle_connect().await;

        assert_eq!(frames.len(), 1);
        match &frames[0] {
            OutboundFrame::Error { message } => assert!(message.contains("spawn failed")),
            other => panic!("expected error frame, got {other:?}"),
        }
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_while_disconnected_is_silent_noop() {
        let mut bridge = bridge();
        let frames = bridge.handle_disconnect().await;

        assert!(frames.is_empty());
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        assert!(bridge.history().is_empty());
    }

    #[tokio::test]
    async fn connect_then_disconnect_cycle() {
        let mut bridge = bridge();
        bridge.handle_connect().await;

        let frames = bridge.handle_disconnect().await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], OutboundFrame::Disconnected { .. }));
        assert_eq!(bridge.state(), ConnectionState::Disconnected);

        // Tool cache is cleared with the connection; a fresh connect reloads
        // it and the cycle repeats.
        let frames = bridge.handle_connect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(bridge.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn message_before_connect_is_not_connected_error() {
        let mut bridge = bridge();
        let frames = bridge.handle_message("add 5 and 3").await;

        assert_eq!(frames.len(), 1);
        match &frames[0] {
            OutboundFrame::Error { message } => {
                assert!(message.contains("Not connected"), "got: {message}");
            }
            other => panic!("expected error frame, got {other:?}"),
        }
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        assert!(bridge.history().is_empty());
    }

    #[tokio::test]
    async fn message_produces_response_and_log_entries() {
        let mut bridge = bridge();
        bridge.handle_connect().await;

        let frames = bridge.handle_message("add 5 and 3").await;
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            OutboundFrame::Response { message, operation } => {
                assert_eq!(message, "🧮 5 + 3 = 8");
                assert!(matches!(
                    operation,
                    Some(McpOperation::Tool { name, .. }) if name == "add"
                ));
            }
            other => panic!("expected response frame, got {other:?}"),
        }
        assert_eq!(bridge.state(), ConnectionState::Connected);

        // system(connected) + user + assistant
        let history = bridge.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].role, Role::User);
        assert_eq!(history[1].content, "add 5 and 3");
        assert_eq!(history[2].role, Role::Assistant);
        assert!(history[2].operation.is_some());
    }

    #[tokio::test]
    async fn greeting_message_carries_resource_operation() {
        let mut bridge = bridge();
        bridge.handle_connect().await;

        let frames = bridge.handle_message("greeting://Ada").await;
        match &frames[0] {
            OutboundFrame::Response { operation, .. } => match operation {
                Some(McpOperation::Resource { uri, .. }) => assert_eq!(uri, "greeting://Ada"),
                other => panic!("expected resource operation, got {other:?}"),
            },
            other => panic!("expected response frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_input_degrades_without_state_change() {
        let mut bridge = SessionBridge::new(Box::new({
            let mut backend = MockBackend::new();
            backend.fail_calls = true;
            backend
        }));
        bridge.handle_connect().await;

        let frames = bridge.handle_message("add 1 and 2").await;
        match &frames[0] {
            OutboundFrame::Response { message, operation } => {
                assert!(message.starts_with("Error performing math operation:"));
                assert!(operation.is_none());
            }
            other => panic!("expected response frame, got {other:?}"),
        }
        assert_eq!(bridge.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn handle_frame_dispatches_by_type() {
        let mut bridge = bridge();
        let frames = bridge.handle_frame(InboundFrame::Connect).await;
        assert_eq!(frames.len(), 2);

        let frames = bridge
            .handle_frame(InboundFrame::Message {
                message: "help".into(),
            })
            .await;
        assert!(matches!(frames[0], OutboundFrame::Response { .. }));

        let frames = bridge.handle_frame(InboundFrame::Disconnect).await;
        assert!(matches!(frames[0], OutboundFrame::Disconnected { .. }));
    }

    #[tokio::test]
    async fn shutdown_is_silent_and_idempotent() {
        let mut bridge = bridge();
        bridge.handle_connect().await;

        bridge.shutdown().await;
        assert_eq!(bridge.state(), ConnectionState::Disconnected);

        bridge.shutdown().await;
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
    }
}
