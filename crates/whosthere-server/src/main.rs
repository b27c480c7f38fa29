//! whosthere server binary, the voice passphrase doorbell.
//!
//! Starts an axum HTTP server with structured logging, the session sweeper,
//! and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use whosthere_server::{app, config, retention, startup};

#[tokio::main]
async fn main() {
    let (config_path, config_source) = config::resolve_config_path(std::env::args().nth(1));

    // Load configuration
    let config = config::load_config(Some(config_path.as_str()))
        .expect("failed to load configuration; the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = %config_path,
        "resolved startup configuration path"
    );

    let services = startup::build_services(&config)
        .expect("invalid configuration; check [auth], [session] and [trace]");

    let missing = services.speech.verify().await;
    if !missing.is_empty() {
        tracing::warn!(
            audio_dir = %config.collaborators.audio_dir.display(),
            ?missing,
            "some phrase clips are missing; those prompts will fail"
        );
    }

    tokio::spawn(retention::start_sweep_task(
        services.state.tracker.clone(),
        Duration::from_secs(config.session.sweep_interval_seconds),
        Duration::from_secs(config.session.retention_seconds),
    ));

    // Build application
    let app = app(services.state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting whosthere server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("whosthere server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
