use crate::worker::RelayJob;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("relay is not accepting jobs")]
    Closed,
}

/// JobEnvelope wraps a RelayJob with its submission sequence number
#[derive(Clone, Debug)]
pub struct JobEnvelope {
    pub seq: u64,
    pub job: RelayJob,
}

/// JobBroker distributes relay jobs from ingress sources to the worker pool
///
/// Architecture:
/// 1. Ingress calls `broker.enqueue(job)`
/// 2. Broker stamps a sequence number
/// 3. Broker sends JobEnvelope{seq, job} to a worker via mpsc channel
/// 4. Round-robin distribution across worker pool
/// 5. Backpressure via bounded channels (default: 100 per worker)
///
/// Dropping the broker closes every channel; workers drain what they already
/// hold and then exit.
pub struct JobBroker {
    worker_channels: Vec<mpsc::Sender<JobEnvelope>>,
    next_worker: AtomicUsize,
    next_seq: AtomicU64,
}

impl JobBroker {
    /// Create a new JobBroker with worker channels
    ///
    /// Returns:
    /// - JobBroker instance (shared with ingress via Arc)
    /// - Vec of receivers (one per worker, for spawning workers)
    pub fn new(num_workers: usize, channel_size: usize) -> (Self, Vec<mpsc::Receiver<JobEnvelope>>) {
        let num_workers = num_workers.max(1);
        let channel_size = channel_size.max(1);
        info!(num_workers, channel_size, "Creating JobBroker with worker channels");

        let mut worker_channels = Vec::with_capacity(num_workers);
        let mut worker_receivers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(channel_size);
            worker_channels.push(tx);
            worker_receivers.push(rx);
            debug!(worker_id, "Created worker channel");
        }

        let broker = Self {
            worker_channels,
            next_worker: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
        };

        (broker, worker_receivers)
    }

    /// Hand a job to the next worker (round-robin)
    ///
    /// Waits when that worker's channel is full. A worker whose channel has
    /// closed is skipped; only when every worker is gone does this fail.
    pub async fn enqueue(&self, job: RelayJob) -> Result<u64, BrokerError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut envelope = JobEnvelope { seq, job };

        for _ in 0..self.worker_channels.len() {
            let worker_idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();

            match self.worker_channels[worker_idx].send(envelope).await {
                Ok(()) => {
                    debug!(seq, worker_idx, "Job sent to worker");
                    return Ok(seq);
                }
                Err(mpsc::error::SendError(returned)) => {
                    warn!(seq, worker_idx, "Worker channel closed, trying next worker");
                    envelope = returned;
                }
            }
        }

        warn!(seq, job_id = %envelope.job.job_id, "No live workers, job not queued");
        Err(BrokerError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Ingress;

    fn create_test_job(file: &str) -> RelayJob {
        RelayJob::new(format!("/in/{file}"), 1, Ingress::Watcher, vec!["zc1".into()]).unwrap()
    }

    #[tokio::test]
    async fn test_broker_enqueue() {
        let (broker, mut receivers) = JobBroker::new(2, 10);

        let seq = broker.enqueue(create_test_job("a.bin")).await.unwrap();
        assert_eq!(seq, 0);

        // Should be received by first worker (round-robin starts at 0)
        let envelope = receivers[0].recv().await.unwrap();
        assert_eq!(envelope.seq, 0);
        assert_eq!(envelope.job.file_name, "a.bin");

        // Next job should go to worker 1
        let seq2 = broker.enqueue(create_test_job("b.bin")).await.unwrap();
        assert_eq!(seq2, 1);

        let envelope2 = receivers[1].recv().await.unwrap();
        assert_eq!(envelope2.job.file_name, "b.bin");
    }

    #[tokio::test]
    async fn test_round_robin_distribution() {
        let (broker, mut receivers) = JobBroker::new(3, 10);

        for i in 0..6 {
            broker.enqueue(create_test_job(&format!("f{i}"))).await.unwrap();
        }

        // Worker 0 gets 0, 3; worker 1 gets 1, 4; worker 2 gets 2, 5
        for (worker_id, rx) in receivers.iter_mut().enumerate() {
            let env1 = rx.recv().await.unwrap();
            let env2 = rx.recv().await.unwrap();
            assert_eq!(env1.seq, worker_id as u64);
            assert_eq!(env2.seq, (worker_id + 3) as u64);
        }
    }

    #[tokio::test]
    async fn test_dead_worker_is_skipped() {
        let (broker, mut receivers) = JobBroker::new(2, 10);
        let live = receivers.pop().unwrap();
        drop(receivers);
        let mut live = live;

        broker.enqueue(create_test_job("a.bin")).await.unwrap();
        assert_eq!(live.recv().await.unwrap().job.file_name, "a.bin");
        broker.enqueue(create_test_job("b.bin")).await.unwrap();
        assert_eq!(live.recv().await.unwrap().job.file_name, "b.bin");
    }

    #[tokio::test]
    async fn test_all_workers_gone() {
        let (broker, receivers) = JobBroker::new(2, 10);
        drop(receivers);

        let result = broker.enqueue(create_test_job("a.bin")).await;
        assert_eq!(result, Err(BrokerError::Closed));
    }

    #[tokio::test]
    async fn test_dropping_broker_closes_workers() {
        let (broker, mut receivers) = JobBroker::new(1, 10);
        broker.enqueue(create_test_job("a.bin")).await.unwrap();
        drop(broker);

        assert!(receivers[0].recv().await.is_some());
        assert!(receivers[0].recv().await.is_none());
    }
}
