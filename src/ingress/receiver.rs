use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::IngressError;
use super::protocol::{ACK, ProtocolError, SUCCESS, error_reply, read_header, read_with_idle};
use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::JobIntake;
use crate::worker::Ingress;

const PAYLOAD_CHUNK: usize = 64 * 1024;

/// Receiver limits and directories, taken from configuration
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub bind: SocketAddr,
    pub incoming_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub max_connections: usize,
    pub max_header_bytes: usize,
    pub max_file_bytes: u64,
    pub idle_timeout: Duration,
}

impl ReceiverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind: config.receiver_addr(),
            incoming_dir: config.incoming_dir.clone(),
            staging_dir: config.staging_dir(),
            quarantine_dir: config.quarantine_dir(),
            max_connections: config.limits.max_connections.max(1),
            max_header_bytes: config.limits.max_header_bytes,
            max_file_bytes: config.limits.max_file_bytes.as_u64(),
            idle_timeout: config.limits.receive_idle_timeout(),
        }
    }
}

struct ConnectionContext {
    settings: ReceiverSettings,
    intake: Arc<JobIntake>,
    metrics: Arc<Metrics>,
}

/// Running TCP receiver
pub struct ReceiverHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReceiverHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait until `deadline` for open connections to finish
    ///
    /// Connections still open at the deadline are dropped.
    pub async fn stop(self, deadline: Instant) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;
        if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
            task.abort();
            warn!("Receiver connections still open at shutdown deadline, closing them");
        }
        info!(addr = %self.local_addr, "Network receiver stopped");
    }
}

/// Bind the listener and start accepting pushes
///
/// Every connection holds one permit from a semaphore sized by
/// `max_connections`; when all are taken the accept loop waits instead of
/// spawning more handlers.
pub async fn spawn_receiver(
    settings: ReceiverSettings,
    intake: Arc<JobIntake>,
    metrics: Arc<Metrics>,
) -> Result<ReceiverHandle, IngressError> {
    for dir in [&settings.incoming_dir, &settings.staging_dir, &settings.quarantine_dir] {
        fs::create_dir_all(dir).await.map_err(|source| IngressError::Directory {
            path: dir.clone(),
            source,
        })?;
    }

    let listener = TcpListener::bind(settings.bind)
        .await
        .map_err(|source| IngressError::Bind {
            addr: settings.bind,
            source,
        })?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "Network receiver listening");

    let (shutdown, shutdown_rx) = watch::channel(false);
    let permits = Arc::new(Semaphore::new(settings.max_connections));
    let ctx = Arc::new(ConnectionContext {
        settings,
        intake,
        metrics,
    });

    let task = tokio::spawn(accept_loop(listener, permits, ctx, shutdown_rx));

    Ok(ReceiverHandle {
        local_addr,
        shutdown,
        task,
    })
}

async fn accept_loop(
    listener: TcpListener,
    permits: Arc<Semaphore>,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Connections live in this set so aborting the loop closes them too
    let mut connections = JoinSet::new();

    loop {
        while connections.try_join_next().is_some() {}

        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        ctx.metrics.connection_accepted();
        let ctx = ctx.clone();
        connections.spawn(async move {
            handle_connection(stream, peer, &ctx).await;
            drop(permit);
        });
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, ctx: &ConnectionContext) {
    debug!(%peer, "Connection accepted");

    let reply = match receive_file(&mut stream, ctx).await {
        Ok(path) => match submit(&path, ctx).await {
            Ok(()) => SUCCESS.to_vec(),
            Err(e) => error_reply(&e),
        },
        Err(e) => {
            ctx.metrics.protocol_error();
            warn!(%peer, error = %e, "Push rejected");
            error_reply(&e)
        }
    };

    if let Err(e) = stream.write_all(&reply).await {
        debug!(%peer, error = %e, "Could not send final reply");
    }
    let _ = stream.shutdown().await;
}

async fn submit(path: &Path, ctx: &ConnectionContext) -> Result<(), ProtocolError> {
    let size = fs::metadata(path).await?.len();
    ctx.intake
        .submit(path, size, Ingress::Network)
        .await
        .map(|_| ())
        .map_err(|e| ProtocolError::Rejected(e.to_string()))
}

/// Header, ACK, payload into staging, size check, promotion into the landing directory
async fn receive_file<S>(stream: &mut S, ctx: &ConnectionContext) -> Result<PathBuf, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let settings = &ctx.settings;
    let (header, leftover) = read_header(stream, settings.max_header_bytes, settings.idle_timeout).await?;

    if header.file_size > settings.max_file_bytes {
        return Err(ProtocolError::FileTooLarge {
            size: header.file_size,
            limit: settings.max_file_bytes,
        });
    }

    stream.write_all(ACK).await?;

    let staged = settings
        .staging_dir
        .join(format!("{}_{}", Uuid::now_v7().simple(), header.file_name));

    let received = match write_payload(stream, &staged, header.file_size, leftover, settings.idle_timeout).await {
        Ok(received) => received,
        Err(e) => {
            discard(&staged, settings, &header.file_name, &e).await;
            return Err(e);
        }
    };

    let on_disk = fs::metadata(&staged).await?.len();
    if received != header.file_size || on_disk != header.file_size {
        let err = ProtocolError::Truncated {
            expected: header.file_size,
            received: on_disk,
        };
        discard(&staged, settings, &header.file_name, &err).await;
        return Err(err);
    }

    let landed = settings.incoming_dir.join(&header.file_name);
    fs::rename(&staged, &landed).await?;
    info!(
        file = %header.file_name,
        size = header.file_size,
        path = %landed.display(),
        "File received"
    );
    Ok(landed)
}

async fn write_payload<R>(
    reader: &mut R,
    staged: &Path,
    expected: u64,
    mut leftover: Vec<u8>,
    idle: Duration,
) -> Result<u64, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(staged).await?;
    leftover.truncate(expected.min(leftover.len() as u64) as usize);
    file.write_all(&leftover).await?;
    let mut received = leftover.len() as u64;

    let mut buf = vec![0u8; PAYLOAD_CHUNK];
    while received < expected {
        let want = (expected - received).min(buf.len() as u64) as usize;
        let n = read_with_idle(reader, &mut buf[..want], idle).await?;
        if n == 0 {
            file.flush().await?;
            return Err(ProtocolError::Truncated { expected, received });
        }
        file.write_all(&buf[..n]).await?;
        received += n as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(received)
}

/// Partial receipts go to quarantine for inspection; other failures are removed
async fn discard(staged: &Path, settings: &ReceiverSettings, file_name: &str, reason: &ProtocolError) {
    let partial = matches!(
        reason,
        ProtocolError::Truncated { .. } | ProtocolError::IdleTimeout(_)
    );

    if partial {
        let target = settings.quarantine_dir.join(format!(
            "{}_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S_%6f"),
            file_name
        ));
        match fs::rename(staged, &target).await {
            Ok(()) => warn!(file = %file_name, path = %target.display(), error = %reason, "Partial receipt quarantined"),
            Err(e) => warn!(file = %file_name, error = %e, "Could not quarantine partial receipt"),
        }
    } else if let Err(e) = fs::remove_file(staged).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %staged.display(), error = %e, "Could not remove staged file");
        }
    }
}
