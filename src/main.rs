use std::path::PathBuf;

use clap::Parser;
use parley_mcp::McpServerConfig;
use parley_server::ServerConfig;

/// WebSocket chat bridge to an MCP backend process.
#[derive(Parser)]
#[command(name = "parley", version)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Command line that launches the MCP backend process,
    /// e.g. "bun run ../server/index.ts"
    #[arg(long)]
    backend: String,

    /// Directory of static UI assets to serve at the root path
    #[arg(long, default_value = "public")]
    static_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let backend = McpServerConfig::from_command_line(&cli.backend)
        .expect("Invalid backend command line");

    let config = ServerConfig {
        port: cli.port,
        static_dir: Some(cli.static_dir),
        ..Default::default()
    };

    let handle = parley_server::start(config, backend)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "Parley server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}
