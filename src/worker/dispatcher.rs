use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::job::RelayJob;
use crate::ledger::{DeliveryRecord, DeliveryStatus, LedgerEntry};
use crate::routing::{Destination, DestinationRegistry};
use crate::transport::{SendOptions, TransferError, Transport};

/// Fans one job out to all of its destinations concurrently
///
/// Each destination's outcome is captured on its own: a failure, timeout or
/// panic in one transfer never cancels or alters a sibling. Transfers across
/// all jobs share one semaphore so the total number of open connections is
/// bounded.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DestinationRegistry>,
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    options: SendOptions,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<DestinationRegistry>,
        transport: Arc<dyn Transport>,
        max_concurrent_transfers: usize,
        options: SendOptions,
    ) -> Self {
        Self {
            registry,
            transport,
            permits: Arc::new(Semaphore::new(max_concurrent_transfers.max(1))),
            options,
        }
    }

    /// Run every transfer for `job` to a terminal state and collect the outcomes
    ///
    /// The returned entry has exactly one record per resolved target, in the
    /// job's target order.
    pub async fn dispatch(&self, job: &RelayJob) -> LedgerEntry {
        let mut slots: Vec<Option<DeliveryRecord>> = vec![None; job.resolved_targets.len()];
        let mut destinations: Vec<Option<Arc<Destination>>> = Vec::with_capacity(slots.len());
        let mut set = JoinSet::new();
        let mut task_slots = HashMap::new();

        for (idx, name) in job.resolved_targets.iter().enumerate() {
            let Some(destination) = self.registry.get(name) else {
                warn!(job_id = %job.job_id, destination = %name, "Target not in registry");
                slots[idx] = Some(DeliveryRecord {
                    destination: name.clone(),
                    address: String::new(),
                    target_path: String::new(),
                    status: DeliveryStatus::Failed(format!("unknown destination '{name}'")),
                    completed_at: Utc::now(),
                });
                destinations.push(None);
                continue;
            };
            destinations.push(Some(destination.clone()));

            let transport = self.transport.clone();
            let permits = self.permits.clone();
            let options = self.options;
            let source = job.source_path.clone();

            let handle = set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| TransferError::Aborted("transfer pool closed".into()))?;

                match tokio::time::timeout(options.timeout, transport.send(&source, &destination, &options)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransferError::Timeout(options.timeout)),
                }
            });
            task_slots.insert(handle.id(), idx);
        }

        while let Some(joined) = set.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, result)) => (id, result),
                Err(join_err) => (
                    join_err.id(),
                    Err(TransferError::Aborted(join_err.to_string())),
                ),
            };
            let Some(&idx) = task_slots.get(&id) else {
                continue;
            };
            if let Some(destination) = &destinations[idx] {
                slots[idx] = Some(self.to_record(job, destination, outcome));
            }
        }

        let records = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| DeliveryRecord {
                    destination: job.resolved_targets[idx].clone(),
                    address: String::new(),
                    target_path: String::new(),
                    status: DeliveryStatus::Failed("transfer ended without a result".into()),
                    completed_at: Utc::now(),
                })
            })
            .collect();

        LedgerEntry::new(job, records)
    }

    fn to_record(
        &self,
        job: &RelayJob,
        destination: &Destination,
        outcome: Result<String, TransferError>,
    ) -> DeliveryRecord {
        let (target_path, status) = match outcome {
            Ok(remote_path) => {
                debug!(job_id = %job.job_id, destination = %destination.name, "Delivery succeeded");
                (remote_path, DeliveryStatus::Success)
            }
            Err(e) => {
                warn!(
                    job_id = %job.job_id,
                    destination = %destination.name,
                    error = %e,
                    "Delivery failed"
                );
                (
                    destination.remote_path_for(&job.file_name),
                    DeliveryStatus::Failed(e.reason()),
                )
            }
        };

        DeliveryRecord {
            destination: destination.name.clone(),
            address: destination.host.clone(),
            target_path,
            status,
            completed_at: Utc::now(),
        }
    }
}
