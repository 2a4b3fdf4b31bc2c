//! HTTP surface of the service.
//!
//! Routes:
//! - `POST /api/pack` - Pack a repository within a token budget (rate limited, bearer auth)
//! - `GET  /healthz`  - Liveness probe

pub(crate) mod auth;
pub mod rate_limit;
pub mod response;

use crate::{
    config::Config,
    error::Result,
    pipeline::{PackRequest, PackResult, Pipeline},
};
use anyhow::Context as _;
use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rate_limit::RateLimiter;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, instrument};

/// Shared, read-only state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    /// Service configuration
    pub config: Config,
    /// Request pipeline
    pub pipeline: Pipeline,
    /// Per-client request counters
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wires the pipeline together with limiter state derived from `config`.
    #[must_use]
    pub fn new(config: Config, pipeline: Pipeline) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limits.clone());
        Self {
            config,
            pipeline,
            rate_limiter,
        }
    }
}

/// Builds the axum [`Router`] with all routes and shared state.
///
/// On `/api/pack` the rate limit is evaluated before authentication, so
/// rejected credentials still count against the caller.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/pack", post(handle_pack))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_token,
        ))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit::enforce_rate_limit,
        ))
        .route("/healthz", get(handle_health))
        .with_state(state)
}

/// `POST /api/pack`
#[instrument(skip_all)]
async fn handle_pack(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PackRequest>, JsonRejection>,
) -> Result<PackResult> {
    let Json(request) = payload?;
    state.pipeline.run(request).await
}

/// `GET /healthz`
async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Binds the configured address and serves until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(config: Config, pipeline: Pipeline) -> anyhow::Result<()> {
    let addr = config.listen_addr;
    let app = create_router(Arc::new(AppState::new(config, pipeline)));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
