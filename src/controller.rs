//! Relay lifecycle: start, stop, reconfigure
//!
//! [`RelayController`] owns the running pieces (workers, ingress sources,
//! intake) built from one immutable [`Config`]. Reconfiguration builds a new
//! set from a new value and swaps it in with stop-then-start; nothing is
//! mutated in place.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::ingress::{
    BundleReport, IngressError, ReceiverHandle, ReceiverSettings, WatcherHandle, relay_bundle, spawn_receiver,
    spawn_watcher,
};
use crate::ledger::{EventLog, LedgerError, TransferLedger};
use crate::observability::{Metrics, MetricsSnapshot};
use crate::queue::{IntakeError, JobBroker, JobIntake};
use crate::routing::{DestinationRegistry, PatternRouter};
use crate::storage::{ArchiveError, OutgoingArchive};
use crate::transport::{SendOptions, Transport};
use crate::worker::{Dispatcher, InFlight, Ingress, PendingJob, RelayContext, RelayJob, run_worker};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Outgoing archive unavailable: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Ingress(#[from] IngressError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error("No configuration loaded")]
    NoConfig,

    #[error("Relay is not running")]
    NotRunning,

    #[error("Invalid file path: {0}")]
    InvalidPath(PathBuf),
}

/// Outcome of a stop request
#[derive(Debug, Clone, Default, Serialize)]
pub struct StopReport {
    pub was_running: bool,
    /// Jobs that reached their ledger entry while stopping
    pub drained: usize,
    /// Jobs still without a ledger entry when the grace period ran out
    pub incomplete: Vec<PendingJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub active: bool,
    pub config_loaded: bool,
    pub incoming_dir: Option<PathBuf>,
    pub destinations_count: usize,
    pub receiver_addr: Option<SocketAddr>,
    pub in_flight: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub metrics: MetricsSnapshot,
}

struct RunningRelay {
    config: Arc<Config>,
    intake: Arc<JobIntake>,
    inflight: Arc<InFlight>,
    watcher: WatcherHandle,
    receiver: ReceiverHandle,
    workers: Vec<JoinHandle<()>>,
    started_at: DateTime<Utc>,
}

struct OpenLedger {
    dir: PathBuf,
    index: PathBuf,
    ledger: Arc<TransferLedger>,
}

pub struct RelayController {
    transport: Arc<dyn Transport>,
    metrics: Arc<Metrics>,
    loaded: RwLock<Option<Arc<Config>>>,
    running: Mutex<Option<RunningRelay>>,
    ledger: std::sync::Mutex<Option<OpenLedger>>,
}

impl RelayController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            metrics: Arc::new(Metrics::new()),
            loaded: RwLock::new(None),
            running: Mutex::new(None),
            ledger: std::sync::Mutex::new(None),
        }
    }

    /// Controller with a configuration loaded but not started
    pub fn with_config(transport: Arc<dyn Transport>, config: Config) -> Result<Self, ControllerError> {
        let controller = Self::new(transport);
        controller.load(config)?;
        Ok(controller)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Validate and remember a configuration without touching the running relay
    pub fn load(&self, config: Config) -> Result<Arc<Config>, ControllerError> {
        config.validate().map_err(ConfigError::from)?;
        // Router construction catches anything validation let through
        let registry = DestinationRegistry::from_config(&config)?;
        PatternRouter::from_config(&config, &registry)?;

        let config = Arc::new(config);
        *self.loaded.write().unwrap_or_else(|p| p.into_inner()) = Some(config.clone());
        Ok(config)
    }

    pub fn loaded_config(&self) -> Option<Arc<Config>> {
        self.loaded.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Start relaying with `config`, or with the loaded one when `None`
    ///
    /// Any running instance is stopped first.
    pub async fn start(&self, config: Option<Config>) -> Result<RelayStatus, ControllerError> {
        let config = match config {
            Some(config) => self.load(config)?,
            None => self.loaded_config().ok_or(ControllerError::NoConfig)?,
        };

        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            let report = self.shutdown(previous).await;
            info!(drained = report.drained, incomplete = report.incomplete.len(), "Previous relay stopped");
        }

        let relay = self.launch(config).await?;
        info!(
            incoming = %relay.config.incoming_dir.display(),
            receiver = %relay.receiver.local_addr(),
            destinations = relay.config.destinations.len(),
            "File relay system started"
        );
        *running = Some(relay);
        drop(running);

        Ok(self.status().await)
    }

    /// Stop ingress, drain the workers for up to the grace period and report
    ///
    /// Idempotent: stopping a stopped relay returns an empty report.
    pub async fn stop(&self) -> StopReport {
        let mut running = self.running.lock().await;
        match running.take() {
            Some(relay) => self.shutdown(relay).await,
            None => StopReport::default(),
        }
    }

    /// Swap in a new configuration; restarts the relay if it was running
    pub async fn reconfigure(&self, config: Config) -> Result<RelayStatus, ControllerError> {
        let config = self.load(config)?;
        let was_running = self.running.lock().await.is_some();
        if was_running {
            self.start(Some(config.as_ref().clone())).await
        } else {
            Ok(self.status().await)
        }
    }

    pub async fn status(&self) -> RelayStatus {
        let running = self.running.lock().await;
        let config = running
            .as_ref()
            .map(|r| r.config.clone())
            .or_else(|| self.loaded_config());

        RelayStatus {
            active: running.is_some(),
            config_loaded: config.is_some(),
            incoming_dir: config.as_ref().map(|c| c.incoming_dir.clone()),
            destinations_count: config.as_ref().map_or(0, |c| c.destinations.len()),
            receiver_addr: running.as_ref().map(|r| r.receiver.local_addr()),
            in_flight: running.as_ref().map_or(0, |r| r.inflight.len()),
            started_at: running.as_ref().map(|r| r.started_at),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Relay one existing file now, bypassing the watcher
    pub async fn submit_file(&self, path: &Path) -> Result<RelayJob, ControllerError> {
        let intake = self.intake().await?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| ControllerError::InvalidPath(path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(ControllerError::InvalidPath(path.to_path_buf()));
        }

        Ok(intake.submit(path, metadata.len(), Ingress::Manual).await?)
    }

    /// Relay every file of an extracted bundle directory except its `config.json`
    pub async fn relay_bundle(&self, dir: &Path) -> Result<BundleReport, ControllerError> {
        let intake = self.intake().await?;
        if !tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(ControllerError::InvalidPath(dir.to_path_buf()));
        }
        Ok(relay_bundle(dir, &intake).await?)
    }

    /// Loaded configuration with every credential masked
    pub fn safe_config(&self) -> Option<serde_json::Value> {
        self.loaded_config().map(|c| c.redacted())
    }

    /// Ledger of the current or most recent run
    pub fn ledger(&self) -> Option<Arc<TransferLedger>> {
        self.ledger
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|open| open.ledger.clone())
    }

    async fn intake(&self) -> Result<Arc<JobIntake>, ControllerError> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.intake.clone())
            .ok_or(ControllerError::NotRunning)
    }

    /// Reuse the open ledger when the paths are unchanged; the index holds a lock on its directory
    fn open_ledger(&self, config: &Config) -> Result<Arc<TransferLedger>, ControllerError> {
        let dir = config.log_dir.clone();
        let index = config.index_path();
        let mut guard = self.ledger.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(open) = guard.as_ref() {
            if open.dir == dir && open.index == index {
                return Ok(open.ledger.clone());
            }
        }
        if let Some(previous) = guard.take() {
            if let Err(e) = previous.ledger.persist() {
                warn!(error = %e, "Could not persist previous ledger index");
            }
        }

        let ledger = Arc::new(TransferLedger::open(&dir, &index)?);
        *guard = Some(OpenLedger {
            dir,
            index,
            ledger: ledger.clone(),
        });
        Ok(ledger)
    }

    async fn launch(&self, config: Arc<Config>) -> Result<RunningRelay, ControllerError> {
        let registry = Arc::new(DestinationRegistry::from_config(&config)?);
        let router = Arc::new(PatternRouter::from_config(&config, &registry)?);
        let ledger = self.open_ledger(&config)?;
        let archive = config
            .outgoing_dir
            .as_deref()
            .map(OutgoingArchive::local)
            .transpose()?;

        let events = Arc::new(EventLog::new(&config.log_dir));
        let inflight = Arc::new(InFlight::new());
        let limits = &config.limits;

        let ctx = Arc::new(RelayContext {
            dispatcher: Dispatcher::new(
                registry.clone(),
                self.transport.clone(),
                limits.max_concurrent_transfers,
                SendOptions::from_limits(limits),
            ),
            ledger,
            archive,
            events: events.clone(),
            metrics: self.metrics.clone(),
            inflight: inflight.clone(),
        });

        let (broker, receivers) = JobBroker::new(limits.dispatch_workers, limits.queue_capacity);
        let workers: Vec<JoinHandle<()>> = receivers
            .into_iter()
            .enumerate()
            .map(|(id, rx)| tokio::spawn(run_worker(id, rx, ctx.clone())))
            .collect();

        let intake = Arc::new(JobIntake::new(
            router,
            Arc::new(broker),
            inflight.clone(),
            events,
            self.metrics.clone(),
        ));

        let receiver = match spawn_receiver(
            ReceiverSettings::from_config(&config),
            intake.clone(),
            self.metrics.clone(),
        )
        .await
        {
            Ok(receiver) => receiver,
            Err(e) => {
                intake.close();
                return Err(e.into());
            }
        };

        let watcher = match spawn_watcher(&config.incoming_dir, limits.quiescence(), intake.clone()) {
            Ok(watcher) => watcher,
            Err(e) => {
                receiver
                    .stop(tokio::time::Instant::now() + limits.shutdown_grace())
                    .await;
                intake.close();
                return Err(e.into());
            }
        };

        Ok(RunningRelay {
            config,
            intake,
            inflight,
            watcher,
            receiver,
            workers,
            started_at: Utc::now(),
        })
    }

    async fn shutdown(&self, relay: RunningRelay) -> StopReport {
        // One deadline covers ingress and the worker drain together
        let deadline = tokio::time::Instant::now() + relay.config.limits.shutdown_grace();

        relay.watcher.stop(deadline).await;
        relay.receiver.stop(deadline).await;
        relay.intake.close();

        let pending_at_close = relay.inflight.len();
        for worker in relay.workers {
            if tokio::time::timeout_at(deadline, worker).await.is_err() {
                warn!("Grace period elapsed with relay jobs still running");
                break;
            }
        }

        let incomplete = relay.inflight.snapshot();
        if let Some(ledger) = self.ledger() {
            if let Err(e) = ledger.persist() {
                warn!(error = %e, "Could not persist ledger index");
            }
        }

        info!(
            drained = pending_at_close.saturating_sub(incomplete.len()),
            incomplete = incomplete.len(),
            "File relay system stopped"
        );

        StopReport {
            was_running: true,
            drained: pending_at_close.saturating_sub(incomplete.len()),
            incomplete,
        }
    }
}
