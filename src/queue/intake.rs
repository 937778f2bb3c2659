use std::path::Path;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use super::broker::{BrokerError, JobBroker};
use crate::config::ConfigError;
use crate::ledger::{EventLog, RelayEvent};
use crate::observability::Metrics;
use crate::routing::PatternRouter;
use crate::worker::{InFlight, Ingress, RelayJob, file_name_of};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Closed(#[from] BrokerError),
}

/// Shared entry point for every ingress source
///
/// Routes a completed file, creates its [`RelayJob`] and queues it for the
/// worker pool. Closing the intake releases the broker so workers can drain
/// and exit; submissions after that fail with [`BrokerError::Closed`].
pub struct JobIntake {
    router: Arc<PatternRouter>,
    broker: RwLock<Option<Arc<JobBroker>>>,
    inflight: Arc<InFlight>,
    events: Arc<EventLog>,
    metrics: Arc<Metrics>,
}

impl JobIntake {
    pub fn new(
        router: Arc<PatternRouter>,
        broker: Arc<JobBroker>,
        inflight: Arc<InFlight>,
        events: Arc<EventLog>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            router,
            broker: RwLock::new(Some(broker)),
            inflight,
            events,
            metrics,
        }
    }

    /// Route and queue a file that is complete on disk
    pub async fn submit(&self, path: &Path, size_bytes: u64, ingress: Ingress) -> Result<RelayJob, IntakeError> {
        let job = match self.create_job(path, size_bytes, ingress) {
            Ok(job) => job,
            Err(e) => {
                self.metrics.job_rejected();
                warn!(path = %path.display(), error = %e, "Relay job rejected");
                return Err(e.into());
            }
        };

        let Some(broker) = self.broker() else {
            self.metrics.job_rejected();
            return Err(BrokerError::Closed.into());
        };

        self.inflight.insert(&job);
        self.metrics.job_detected();
        self.events
            .emit(
                RelayEvent::Detected,
                &job,
                &format!("targets={}", job.resolved_targets.join(",")),
            )
            .await;
        info!(
            job_id = %job.job_id,
            file = %job.file_name,
            size = job.size_bytes,
            ingress = %ingress,
            targets = ?job.resolved_targets,
            "Relay job created"
        );

        if let Err(e) = broker.enqueue(job.clone()).await {
            self.inflight.remove(&job.job_id);
            self.metrics.job_rejected();
            return Err(e.into());
        }

        Ok(job)
    }

    /// Stop accepting jobs; queued jobs are still processed
    pub fn close(&self) {
        let mut guard = self.broker.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.take().is_some() {
            info!("Job intake closed");
        }
    }

    fn create_job(&self, path: &Path, size_bytes: u64, ingress: Ingress) -> Result<RelayJob, ConfigError> {
        let file_name = file_name_of(path)?;
        let targets = self.router.route(&file_name);
        RelayJob::new(path, size_bytes, ingress, targets)
    }

    fn broker(&self) -> Option<Arc<JobBroker>> {
        self.broker
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
