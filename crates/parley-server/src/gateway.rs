//! Per-connection frame dispatch.
//!
//! Each UI connection gets its own session task, so frames from one
//! connection are processed strictly in arrival order while different
//! connections stay independent. A failure in one session never reaches
//! another.

use std::sync::Arc;

use tokio::sync::mpsc;

use parley_bridge::SessionBridge;
use parley_core::frames::{InboundFrame, OutboundFrame};
use parley_core::ChatError;

use crate::connection::{ConnectionId, ConnectionRegistry};

/// Deserialize one raw frame and run it through the bridge.
///
/// Malformed frames (invalid JSON, unknown `type`, missing fields) produce
/// exactly one error frame and leave the bridge state untouched.
pub async fn dispatch_frame(bridge: &mut SessionBridge, raw: &str) -> Vec<OutboundFrame> {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting malformed frame");
            let err = ChatError::Protocol(e.to_string());
            return vec![OutboundFrame::error(err.to_string())];
        }
    };
    bridge.handle_frame(frame).await
}

/// Drive one session until its inbound channel closes, then tear down the
/// backend. Outbound frames go to the originating connection only.
pub async fn run_session(
    mut bridge: SessionBridge,
    mut inbound_rx: mpsc::Receiver<String>,
    registry: Arc<ConnectionRegistry>,
    connection_id: ConnectionId,
) {
    while let Some(raw) = inbound_rx.recv().await {
        for frame in dispatch_frame(&mut bridge, &raw).await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    registry.send_to(&connection_id, json);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound frame");
                }
            }
        }
    }

    bridge.shutdown().await;
    tracing::debug!(connection_id = %connection_id, "Session task finished");
}
