use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mcp_camera::api::{ApiServer, AppState};
use mcp_camera::camera::CameraManager;
use mcp_camera::config::AppConfig;
use mcp_camera::logging;
use mcp_camera::mcp::{CameraTools, McpHandler, stdio};

/// Transport the MCP server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// `POST /mcp` plus the stream endpoint
    Http,
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-camera", version, about = "Camera tools for MCP clients, backed by ffmpeg")]
struct Args {
    #[arg(value_enum, default_value_t = Mode::Http)]
    mode: Mode,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env_or_default();
    let _log_guard = logging::init_logging(&config.log)?;
    config.log_ignored();

    info!(
        name = %config.server.name,
        version = %config.server.version,
        mode = ?args.mode,
        "Starting MCP camera server"
    );

    let manager = Arc::new(CameraManager::from_config(&config));
    let count = manager.initialize_devices().await;
    if count == 0 {
        warn!("No cameras detected");
    } else {
        info!(count, "Cameras detected");
    }

    let tools = CameraTools::new(manager.clone(), config.artifacts.clone());
    let handler = Arc::new(McpHandler::new(tools, config.server.clone()));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
        }
        signal_cancel.cancel();

        // The handler replaced the default SIGINT action; a second Ctrl-C forces exit.
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received second Ctrl-C, exiting immediately");
            std::process::exit(130);
        }
    });

    let result = match args.mode {
        Mode::Stdio => stdio::serve_stdio(handler, cancel.clone()).await,
        Mode::Http => {
            let state = AppState::new(manager.clone(), handler);
            ApiServer::with_cancel_token(config.api.clone(), state, cancel.clone())
                .run()
                .await
        }
    };

    manager.shutdown().await;
    result?;
    info!("MCP camera server stopped");
    Ok(())
}
