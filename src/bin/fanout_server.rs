//! Retrieval service binary.
//!
//! Loads configuration, starts the HTTP server and runs until Ctrl-C (or
//! SIGTERM on Unix), then drains in-flight requests and exits.

use fanout::{FanoutServer, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::load().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        anyhow::anyhow!("fanout-server failed to load config: {e}")
    })?;

    tracing::info!(
        bind = %config.server.bind,
        environment = %config.server.environment,
        lanes = config.retrieval.lanes.len(),
        "fanout-server starting"
    );

    let server = FanoutServer::start(&config)
        .await
        .map_err(|e| anyhow::anyhow!("fanout-server failed to start: {e}"))?;

    shutdown_signal().await;
    tracing::info!("shutdown requested");
    server.shutdown().await;

    tracing::info!("fanout-server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
