use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use parley_bridge::SessionBridge;
use parley_mcp::{McpClient, McpServerConfig};

use crate::connection::{self, ConnectionRegistry};
use crate::gateway;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    /// Directory of UI assets served at the root path, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_send_queue: 256,
            static_dir: None,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub backend: McpServerConfig,
    pub max_send_queue: usize,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(
    config: ServerConfig,
    backend: McpServerConfig,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ConnectionRegistry::new(config.max_send_queue));

    let _cleanup = connection::start_cleanup_task(
        Arc::clone(&registry),
        Duration::from_secs(60),
    );

    let state = AppState {
        registry,
        backend,
        max_send_queue: config.max_send_queue,
    };

    let router = build_router(state, config.static_dir);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Parley server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Wire up a new UI connection: register it, give it its own session bridge
/// (and therefore its own backend process), and pump frames until it closes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, outbound_rx) = state.registry.register();
    tracing::info!(connection_id = %connection_id, "WebSocket client connected");

    let (inbound_tx, inbound_rx) = mpsc::channel(state.max_send_queue);
    let bridge = SessionBridge::new(Box::new(McpClient::new(state.backend.clone())));
    tokio::spawn(gateway::run_session(
        bridge,
        inbound_rx,
        Arc::clone(&state.registry),
        connection_id.clone(),
    ));

    connection::handle_ws_connection(
        socket,
        connection_id,
        outbound_rx,
        state.registry,
        inbound_tx,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "connections": state.registry.count(),
    }))
}
