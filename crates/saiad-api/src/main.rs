//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use saiad_api::{create_router, metrics, ApiConfig, AppState};
use saiad_queue::{BackendKind, Backends};
use saiad_worker::WorkerConfig;

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "saiad=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    init_tracing();
    info!("Starting saiad-api");

    let config = ApiConfig::from_env();
    info!(host = %config.host, port = config.port, "API config");

    let backends = Backends::from_env()
        .await
        .context("failed to connect job backends")?;
    let storage = saiad_storage::store_from_env()
        .await
        .context("failed to initialize artifact storage")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    // An in-memory queue is only visible to this process, so the pipeline runs here.
    let embedded = config
        .embedded_worker
        .unwrap_or(backends.kind == BackendKind::Memory);
    let worker = if embedded {
        let worker_config = WorkerConfig::from_env();
        info!("Running embedded worker");
        Some(
            saiad_worker::start(&backends, worker_config)
                .await
                .context("failed to start embedded worker")?,
        )
    } else {
        if backends.kind == BackendKind::Memory {
            warn!("In-memory backend without an embedded worker: jobs will never run");
        }
        None
    };

    let state = AppState::new(config.clone(), &backends, storage);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
