use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    auth,
    config::Config,
    handlers,
    logs::{DrainBuffer, LogDb},
    metrics,
    signals::{setup_signal_handlers, ShutdownSignal},
};

/// Shared state for the API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<LogDb>,
    pub buffer: Arc<DrainBuffer>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<LogDb>) -> Self {
        let buffer = Arc::new(DrainBuffer::new(
            Arc::clone(&db),
            config.syslog_drain.max_queue_size,
        ));
        Self {
            config: Arc::new(config),
            db,
            buffer,
        }
    }
}

/// Start the log server
///
/// This function:
/// 1. Initializes metrics
/// 2. Sets up signal handlers for graceful shutdown
/// 3. Opens the database and starts the drain buffer's flush task
/// 4. Binds to the configured address and serves requests
/// 5. After shutdown, flushes the drain buffer and closes the database
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics());

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let db = LogDb::open(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}",
                config.database.path.display()
            )
        })?;
    let state = AppState::new(config, Arc::new(db));
    let config = Arc::clone(&state.config);

    let flush_handle = state
        .buffer
        .spawn_flush_task(config.syslog_drain.flush_interval(), shutdown_tx.subscribe());

    let app = create_router(state.clone(), metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting logvault on {}", addr);
    info!(
        database = %config.database.path.display(),
        flush_interval_ms = config.syslog_drain.flush_interval_ms,
        max_queue_size = config.syslog_drain.max_queue_size,
        "Configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await;

    // the flush task may still be running if serve failed on its own
    let _ = shutdown_tx.send(ShutdownSignal::Graceful);
    if let Err(e) = flush_handle.await {
        error!(error = %e, "Flush task panicked");
    }

    match state.buffer.flush().await {
        Ok(count) => info!(count, "Final drain buffer flush completed"),
        Err(e) => error!(error = %e, "Final drain buffer flush failed"),
    }
    state.db.close().await;

    signal_handle.abort();
    served?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    let auth_routes = Router::new()
        .route("/v1/logs", post(handlers::otlp::ingest_logs))
        .route("/drain", post(handlers::syslog_drain::drain))
        .route(
            "/api/logs",
            get(handlers::logs_api::list_logs).delete(handlers::logs_api::delete_logs),
        )
        .route("/api/logs/count", get(handlers::logs_api::count_logs))
        .route("/api/logs/volumes", get(handlers::logs_api::log_volumes))
        .route("/api/logs/download", get(handlers::logs_api::download))
        .route("/api/logs/vacuum", post(handlers::logs_api::vacuum))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth::auth_middleware,
        ))
        .with_state(state);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(auth_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}
