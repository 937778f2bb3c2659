use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::job::RelayJob;

/// A job that has been accepted but whose ledger entry is not yet written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingJob {
    pub job_id: Uuid,
    pub file_name: String,
    pub detected_at: DateTime<Utc>,
}

/// Jobs between submission and ledger write
#[derive(Debug, Default)]
pub struct InFlight {
    jobs: Mutex<HashMap<Uuid, PendingJob>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: &RelayJob) {
        let pending = PendingJob {
            job_id: job.job_id,
            file_name: job.file_name.clone(),
            detected_at: job.detected_at,
        };
        self.lock().insert(job.job_id, pending);
    }

    pub fn remove(&self, job_id: &Uuid) -> bool {
        self.lock().remove(job_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pending jobs, oldest first
    pub fn snapshot(&self) -> Vec<PendingJob> {
        let mut jobs: Vec<PendingJob> = self.lock().values().cloned().collect();
        jobs.sort_by_key(|j| j.job_id);
        jobs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Ingress;

    #[test]
    fn test_insert_remove_snapshot() {
        let tracker = InFlight::new();
        let a = RelayJob::new("/in/a", 1, Ingress::Watcher, vec!["x".into()]).unwrap();
        let b = RelayJob::new("/in/b", 1, Ingress::Watcher, vec!["x".into()]).unwrap();

        tracker.insert(&a);
        tracker.insert(&b);
        assert_eq!(tracker.len(), 2);

        assert!(tracker.remove(&a.job_id));
        assert!(!tracker.remove(&a.job_id));

        let pending = tracker.snapshot();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_name, "b");
    }
}
