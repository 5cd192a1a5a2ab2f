use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueHint};
use log::LevelFilter;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::bridge::BridgeConfig;

mod bridge;
mod routes;

#[tokio::main(flavor = "current_thread")] // single-threaded, multi requires rt-multi-thread feature
async fn main() -> std::io::Result<()> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .filter(Some("tower_http"), LevelFilter::Debug)
        .filter(Some("mcp_http_bridge"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    let CliArgs {
        host,
        port,
        token,
        server_path,
        timeout_secs,
    } = CliArgs::parse();

    log::info!(
        version = env!("CARGO_PKG_VERSION"),
        server_path:debug = server_path;
        "Initializing bridge"
    );

    let config = Arc::new(BridgeConfig {
        server_path,
        token,
        timeout: Duration::from_secs(timeout_secs),
    });

    let router = routes::routes(config).layer(TraceLayer::new_for_http());

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!(
        addr:display = host,
        port:display = port;
        "listening to TCP"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[derive(Parser)]
struct CliArgs {
    /// The host address for the bridge server.
    #[arg(
        long,
        value_name = "URI",
        value_hint = ValueHint::Hostname,
        default_value = "0.0.0.0",
        env = "HOST",
    )]
    host: String,
    /// The host port for the bridge server.
    #[arg(
        short,
        long,
        value_name = "PORT",
        value_hint = ValueHint::Other,
        default_value = "8080",
        env = "PORT",
    )]
    port: NonZeroU16,
    /// Access token injected into every spawned server process.
    ///
    /// Required; without it the bridge refuses to start.
    #[arg(
        long,
        value_name = "TOKEN",
        env = "GITHUB_PERSONAL_ACCESS_TOKEN",
        hide_env_values = true,
    )]
    token: String,
    /// Path of the MCP server binary spawned once per request.
    #[arg(
        long,
        value_name = "PATH",
        value_hint = ValueHint::ExecutablePath,
        default_value = "/server/github-mcp-server",
        env = "MCP_SERVER_PATH",
    )]
    server_path: PathBuf,
    /// Budget in seconds for one spawn-to-exit cycle.
    #[arg(
        long,
        value_name = "SECONDS",
        default_value = "30",
        env = "MCP_TIMEOUT_SECS",
    )]
    timeout_secs: u64,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT (ctrl+c) handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => log::info!("received SIGINT (ctrl+c), shutting down"),
        () = terminate => log::info!("received SIGTERM, shutting down"),
    }
}
