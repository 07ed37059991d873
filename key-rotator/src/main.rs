//! KMS Rotator web server.
//!
//! Receives Eventarc webhooks and sets the rotation period of the crypto key
//! named in each event to 90 days.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kms_rotator::{router, AppState, Config, KmsClient, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging before loading config so its warnings are emitted
    init_logging(LogFormat::from_env());

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        rotation_mode = ?config.rotation_mode,
        kms_endpoint = %config.kms_endpoint,
        static_token_configured = config.kms_access_token.is_some(),
        "config_loaded"
    );

    let kms = KmsClient::from_config(&config).context("Failed to create KMS client")?;
    info!("kms_client_created");

    let state = AppState::new(config.clone(), Arc::new(kms));
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Initialize structured logging. `RUST_LOG` overrides the default level.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (json, pretty) = match format {
        LogFormat::Json => (Some(fmt::layer().json().flatten_event(true)), None),
        LogFormat::Pretty => (None, Some(fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
