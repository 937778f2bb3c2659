//! Job runner - takes one RelayJob from detection to a ledger entry

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::dispatcher::Dispatcher;
use super::inflight::InFlight;
use super::job::RelayJob;
use crate::ledger::{EventLog, LedgerEntry, RelayEvent, TransferLedger};
use crate::observability::Metrics;
use crate::queue::JobEnvelope;
use crate::storage::OutgoingArchive;

/// Everything a worker needs to carry a job through the pipeline
pub struct RelayContext {
    pub dispatcher: Dispatcher,
    pub ledger: Arc<TransferLedger>,
    pub archive: Option<OutgoingArchive>,
    pub events: Arc<EventLog>,
    pub metrics: Arc<Metrics>,
    pub inflight: Arc<InFlight>,
}

/// Process a single relay job
///
/// archive copy (once per job) → dispatch to every target → ledger record.
/// Archive and ledger failures are logged and noted in the event log; they
/// never stop the remaining steps.
pub async fn process_job(ctx: &RelayContext, job: RelayJob) -> LedgerEntry {
    if let Some(archive) = &ctx.archive {
        if let Err(e) = archive.archive(&job.source_path, &job.file_name).await {
            ctx.metrics.archive_failed();
            warn!(job_id = %job.job_id, error = %e, "Archive copy failed, relaying anyway");
            ctx.events
                .emit(RelayEvent::ArchiveFailed, &job, &format!("error=\"{e}\""))
                .await;
        }
    }

    ctx.events
        .emit(
            RelayEvent::Dispatching,
            &job,
            &format!("targets={}", job.resolved_targets.join(",")),
        )
        .await;

    let entry = ctx.dispatcher.dispatch(&job).await;
    for record in &entry.destinations {
        ctx.metrics.delivery(record.status.is_success());
    }

    match ctx.ledger.record_async(&entry).await {
        Ok(path) => info!(job_id = %job.job_id, path = %path.display(), "Transfer log saved"),
        Err(e) => {
            error!(job_id = %job.job_id, error = %e, "Ledger write failed");
            ctx.events
                .emit(RelayEvent::LedgerFailed, &job, &format!("error=\"{e}\""))
                .await;
        }
    }

    ctx.events
        .emit(
            RelayEvent::Completed,
            &job,
            &format!("succeeded={} failed={}", entry.succeeded(), entry.failed()),
        )
        .await;
    ctx.metrics.job_completed();
    ctx.inflight.remove(&job.job_id);

    info!(
        job_id = %job.job_id,
        file = %job.file_name,
        succeeded = entry.succeeded(),
        failed = entry.failed(),
        "Relay job completed"
    );

    entry
}

/// Worker loop: runs until its channel is closed and drained
pub async fn run_worker(worker_id: usize, mut rx: mpsc::Receiver<JobEnvelope>, ctx: Arc<RelayContext>) {
    info!(worker_id, "Relay worker started");
    while let Some(envelope) = rx.recv().await {
        tracing::debug!(worker_id, seq = envelope.seq, job_id = %envelope.job.job_id, "Job received");
        process_job(&ctx, envelope.job).await;
    }
    info!(worker_id, "Relay worker stopped");
}
