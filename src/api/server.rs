use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{services, state::AppState};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_IN_FLIGHT_REQUESTS: usize = 64;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(services::health))
        .route("/api/relay-status/", get(services::relay_status))
        .route(
            "/api/relay-config/",
            get(services::get_relay_config).post(services::update_relay_config),
        )
        .route("/api/relay-start/", post(services::relay_start))
        .route("/api/relay-stop/", post(services::relay_stop))
        .route("/api/send-file/", post(services::send_file))
        .route("/api/relay-bundle/", post(services::relay_bundle))
        .route("/api/ledger/", get(services::list_ledger))
        .route("/api/ledger/{job_id}", get(services::get_ledger_entry))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS))
        .layer(TraceLayer::new_for_http())
}

/// Serve the operator API until `shutdown` resolves
pub async fn run<F>(address: SocketAddr, state: AppState, shutdown: F) -> Result<(), AnyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "Operator API listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
