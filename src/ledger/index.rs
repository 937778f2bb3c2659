use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};
use uuid::Uuid;

use super::entry::LedgerEntry;
use super::error::{LedgerError, Result};
use super::partitions::{JOB_KEY_PREFIX, JOBS_PARTITION, encode_job_key};

/// Fjall-backed lookup index over recorded ledger entries
///
/// Secondary to the per-job JSON files: it answers "what happened to job X"
/// and "what were the last N jobs" without scanning the log directory.
#[derive(Clone)]
pub struct LedgerIndex {
    keyspace: Keyspace,
    jobs: PartitionHandle,
}

impl LedgerIndex {
    /// Open or create an index at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger index at: {}", path.display());

        std::fs::create_dir_all(path)?;

        let keyspace = Config::new(path).open()?;
        let jobs = keyspace.open_partition(JOBS_PARTITION, PartitionCreateOptions::default())?;

        Ok(Self { keyspace, jobs })
    }

    /// Index an entry; an entry is written once and never replaced
    pub fn insert(&self, entry: &LedgerEntry) -> Result<()> {
        let key = encode_job_key(&entry.job_id);
        if self.jobs.contains_key(&key)? {
            return Err(LedgerError::AlreadyRecorded(entry.job_id.to_string()));
        }
        let value = serde_json::to_vec(entry)?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %entry.job_id, "Indexed ledger entry");
        Ok(())
    }

    pub fn get(&self, job_id: &Uuid) -> Result<Option<LedgerEntry>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Most recent entries first
    pub fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::with_capacity(limit.min(256));
        for item in self.jobs.prefix(JOB_KEY_PREFIX).rev().take(limit) {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}
