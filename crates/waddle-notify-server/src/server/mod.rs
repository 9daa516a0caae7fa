use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};
use waddle_notify::{NotificationService, Sweeper};

use crate::config::ServerConfig;

mod routes;

/// Server application state
pub struct AppState {
    /// Notification core shared by every route and session
    pub service: Arc<NotificationService>,
    /// Periodic retry sweeper
    pub sweeper: Arc<Sweeper>,
    /// Server configuration
    pub config: ServerConfig,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let service = Arc::new(NotificationService::new(config.to_notify_config()));
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(service.retry_engine()),
            config.retry_interval,
        ));

        Self {
            service,
            sweeper,
            config,
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }
}

/// Start the HTTP/WebSocket server and the retry sweeper.
///
/// Runs until Ctrl-C or SIGTERM, then stops the sweeper, closes open
/// WebSocket sessions and drains in-flight requests.
pub async fn start(config: ServerConfig) -> Result<()> {
    let state = Arc::new(AppState::new(config));
    let stop_token = state.shutdown.clone();

    let listener = tokio::net::TcpListener::bind(state.config.bind_addr).await?;
    info!(addr = %state.config.bind_addr, "Bound HTTP listener");

    let sweeper_handle = Arc::clone(&state.sweeper).start(stop_token.clone());

    tokio::spawn(wait_for_signal(stop_token.clone()));

    let result = start_http_server(Arc::clone(&state), listener, stop_token.clone()).await;

    // The HTTP server may exit on its own error; stop the sweeper either way
    stop_token.cancel();
    if let Err(e) = sweeper_handle.join().await {
        error!(error = %e, "Retry sweeper task failed");
    }

    let remaining = state.service.total_pending();
    if remaining > 0 {
        warn!(pending = remaining, "Shutting down with undelivered notifications");
    }
    info!("Graceful shutdown complete");

    result
}

/// Cancel `stop_token` on Ctrl-C or SIGTERM.
async fn wait_for_signal(stop_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = stop_token.cancelled() => return,
    }

    stop_token.cancel();
}

/// Start the HTTP server with graceful shutdown support.
async fn start_http_server(
    state: Arc<AppState>,
    listener: tokio::net::TcpListener,
    stop_token: CancellationToken,
) -> Result<()> {
    let app = create_router(state);

    let addr = listener.local_addr()?;
    info!("Starting Axum HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop_token.cancelled().await;
            info!("HTTP server received shutdown signal, draining connections");
        })
        .await?;

    Ok(())
}

/// Configure CORS layer.
///
/// With a comma-separated origin list only those origins are allowed.
/// Otherwise falls back to permissive CORS (suitable for development).
fn configure_cors(origins: Option<&str>) -> CorsLayer {
    use tower_http::cors::AllowOrigin;

    match origins {
        Some(origins) if !origins.is_empty() => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            if allowed.is_empty() {
                warn!("CORS origins set but none parsed, falling back to permissive CORS");
                CorsLayer::permissive()
            } else {
                info!(origins = ?allowed, "Configured CORS with explicit allowed origins");
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(allowed))
                    .allow_methods(tower_http::cors::Any)
                    .allow_headers(tower_http::cors::Any)
            }
        }
        _ => CorsLayer::permissive(),
    }
}

/// Create the Axum router with all routes and middleware
fn create_router(state: Arc<AppState>) -> Router {
    let cors = configure_cors(state.config.cors_origins.as_deref());

    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .with_state(Arc::clone(&state))
        // Submission, inspection and manual retry
        .merge(routes::notifications::router(Arc::clone(&state)))
        // Client connections
        .merge(routes::websocket::router(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.service.status();
    let uptime = Utc::now() - state.started_at;

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "waddle-notify-server",
            "version": env!("CARGO_PKG_VERSION"),
            "connections": status.connections,
            "pending": status.total_pending,
            "pending_clients": status.pending_clients,
            "uptime_secs": uptime.num_seconds(),
        })),
    )
}
