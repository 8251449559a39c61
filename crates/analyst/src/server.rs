//! Axum server setup: routes, static files, timeouts, graceful shutdown.

use std::future::IntoFuture;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use analyst_agent::Analyzer;
use analyst_config::ServerConfig;
use analyst_provider::Provider;

use crate::handlers::{self, AppState};

/// Fixed grace period for draining in-flight requests after SIGINT/SIGTERM.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Build the router: the analyze API plus the static UI at `/`.
pub fn build_router<P: Provider + 'static>(analyzer: Arc<Analyzer<P>>) -> Router {
    let state = AppState { analyzer };

    Router::new()
        .route("/api/v1/analyze", post(handlers::analyze::<P>))
        .route("/api/v1/health", get(handlers::health))
        .fallback_service(ServeDir::new("web/static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until SIGINT/SIGTERM, then drain in-flight requests for at most
/// [`SHUTDOWN_GRACE`], counted from the moment the signal fires. Requests
/// still running when the grace period elapses are abandoned.
pub async fn run<P: Provider + 'static>(
    cfg: &ServerConfig,
    analyzer: Arc<Analyzer<P>>,
) -> anyhow::Result<()> {
    let app = build_router(analyzer).layer(TimeoutLayer::new(cfg.read_timeout.max(cfg.write_timeout)));

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr()).await?;
    info!(address = %cfg.bind_addr(), "Starting server");

    let (drain_tx, mut drain_rx) = watch::channel(false);
    let mut server = pin!(axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = drain_tx.send(true);
        })
        .into_future());

    tokio::select! {
        result = &mut server => result?,
        _ = drain_rx.changed() => {
            info!("Shutdown signal received, draining in-flight requests");
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Grace period elapsed with requests still in flight, shutting down");
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
