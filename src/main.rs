use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ddns_allowlist::{
    AppState, Config, ConfigError, DdnsAllowlistLayer, build_router, metrics, utils,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();

    // Initialize logging from the configured level
    let filter = config
        .as_ref()
        .map_or_else(|_| EnvFilter::new("info"), Config::log_filter);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting DDNS allowlist server v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Result<Config, ConfigError>) -> Result<(), exitcode::ExitCode> {
    let config = config.map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        hosts = ?config.allowlist.source_hosts,
        literal_ips = ?config.allowlist.literal_ips,
        refresh_interval_secs = config.allowlist.refresh_interval_seconds,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    let allowlist = DdnsAllowlistLayer::new(&config.allowlist, &config.filter_name).map_err(|e| {
        error!("Failed to create allowlist filter: {e}");
        exitcode::CONFIG
    })?;

    let state = AppState::new(allowlist, config.clone());
    let app = build_router(state.clone());

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("  GET /        - Protected by allowlist");
    info!("  GET /health  - Allowlist status");
    info!("  GET /ready   - Readiness check");

    // ConnectInfo supplies the transport remote address to the filter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
