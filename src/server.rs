use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relaybox::api::{self, AppState};
use relaybox::config::Config;
use relaybox::controller::RelayController;
use relaybox::ingress::push_file;
use relaybox::transport::SftpTransport;
use tokio::sync::oneshot;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Start the relay and the operator API; stop both on Ctrl+C / SIGTERM
pub async fn run(config_path: Option<PathBuf>, api_addr: Option<SocketAddr>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let api_addr = api_addr.unwrap_or(config.api_addr);

    let controller = Arc::new(RelayController::new(Arc::new(SftpTransport::new())));
    controller.start(Some(config)).await?;

    // The API stops accepting requests first, then the relay drains
    let (stopped_tx, stopped_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        api::shutdown_signal().await;
        let _ = stopped_tx.send(());
    };

    let served = api::run(api_addr, AppState::new(controller.clone()), shutdown).await;
    if stopped_rx.await.is_err() {
        warn!("Operator API ended before a shutdown signal");
    }

    let report = controller.stop().await;
    for job in &report.incomplete {
        warn!(job_id = %job.job_id, file = %job.file_name, "Relay job left incomplete at shutdown");
    }
    info!(drained = report.drained, incomplete = report.incomplete.len(), "Shutdown complete");

    served
}

pub fn check_config(config_path: Option<PathBuf>) -> Result<(), AnyError> {
    let config = Config::load(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

pub async fn push(file: PathBuf, addr: SocketAddr, timeout_secs: u64) -> Result<(), AnyError> {
    let size = push_file(addr, &file, Duration::from_secs(timeout_secs)).await?;
    println!("sent {} ({size} bytes) to {addr}", file.display());
    Ok(())
}
