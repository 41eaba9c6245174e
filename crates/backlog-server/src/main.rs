//! Backlog server binary.
//!
//! Starts the event API and the metrics listener, runs the retention task,
//! and shuts both listeners down gracefully on SIGTERM/SIGINT. Long polls
//! can legitimately hold connections for up to 20 seconds, so graceful
//! shutdown is bounded by a short grace window before the process exits.

use backlog_server::{app, config::Config, metrics, retention, AppState, DEFAULT_POLL_TIMEOUT};
use backlog_store::{create_pool, DbRuntimeSettings, EventIdGenerator, Store};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let pool = create_pool(&config.state_file, DbRuntimeSettings::default())
        .expect("failed to create database pool — check --state-file");
    let store = Arc::new(Store::open(pool).expect("failed to initialize event store"));
    let ids = Arc::new(EventIdGenerator::new().expect("failed to initialize id generator"));

    let state = AppState {
        store: store.clone(),
        ids,
        poll_timeout: DEFAULT_POLL_TIMEOUT,
    };

    // Bind before spawning so a taken port fails startup instead of a task.
    let api_listener = TcpListener::bind(config.addr)
        .await
        .expect("failed to bind event api address — is another process using this port?");
    let metrics_listener = TcpListener::bind(config.metrics_addr)
        .await
        .expect("failed to bind metrics address — is another process using this port?");

    let retention_task = tokio::spawn(retention::start_retention_task(
        store.clone(),
        config.retention_period,
        config.prune_frequency,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    tracing::info!(addr = %config.addr, "event api started");
    let mut api_task = tokio::spawn(serve(
        app(state),
        api_listener,
        shutdown_rx.clone(),
        "event api",
    ));

    tracing::info!(addr = %config.metrics_addr, "metrics server started");
    let mut metrics_task = tokio::spawn(serve(
        metrics::metrics_app(store),
        metrics_listener,
        shutdown_rx,
        "metrics server",
    ));

    tokio::select! {
        () = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            retention_task.abort();

            let drain = async {
                let _ = api_task.await;
                let _ = metrics_task.await;
            };
            if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
                tracing::info!("servers did not shut down gracefully, forcing close");
            }
            tracing::info!("server exiting");
        }
        _ = &mut api_task => {
            tracing::error!("event api terminated unexpectedly");
            std::process::exit(1);
        }
        _ = &mut metrics_task => {
            tracing::error!("metrics server terminated unexpectedly");
            std::process::exit(1);
        }
    }
}

/// Serves a router until the shutdown channel fires.
async fn serve(
    router: axum::Router,
    listener: TcpListener,
    mut shutdown: watch::Receiver<()>,
    name: &'static str,
) {
    let graceful = async move {
        let _ = shutdown.changed().await;
        tracing::info!(server = name, "graceful shutdown");
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(graceful)
        .await
    {
        tracing::error!(server = name, error = %e, "server error");
    }
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
