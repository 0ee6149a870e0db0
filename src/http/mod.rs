//! Thin HTTP plumbing.
//!
//! Route registration and server bootstrap only; the pipeline and executor
//! do the real work. Applications hand their routes to [`router`], which
//! attaches the health endpoint and the failure-logging layer.

pub mod response;

use crate::error::{ApiError, ApiResult};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::{Router, middleware};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Attach the gateway's plumbing to application routes.
pub fn router(app_routes: Router) -> Router {
    app_routes
        .route("/health", get(health))
        .layer(middleware::from_fn(response::log_failures))
}

async fn health() -> impl IntoResponse {
    Json(response::success_envelope(json!({"status": "ok"}), None))
}

/// Serve the router until SIGINT/SIGTERM, with a bounded graceful drain.
pub async fn serve(bind_addr: &str, app: Router) -> ApiResult<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ApiError::connection(format!("Failed to bind to {bind_addr}: {e}")))?;

    info!(addr = %bind_addr, "HTTP listener ready");

    // Open connections may keep the server alive indefinitely, so force
    // exit after a timeout once the shutdown signal is received.
    let shutdown_notify = Arc::new(Notify::new());
    let notify = shutdown_notify.clone();
    let shutdown_signal = async move {
        wait_for_signal().await;
        notify.notify_one();
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

    tokio::select! {
        result = server => {
            match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => return Err(ApiError::general(format!("HTTP server error: {e}"))),
            }
        }
        _ = async {
            shutdown_notify.notified().await;
            info!(
                timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                "Waiting for connections to close (send signal again to force exit)"
            );
            tokio::select! {
                _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                    warn!("Graceful shutdown timeout, forcing exit");
                }
                _ = wait_for_signal() => {
                    warn!("Received second signal, forcing immediate exit");
                }
            }
        } => {}
    }

    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

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
}
