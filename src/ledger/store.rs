use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entry::LedgerEntry;
use super::error::{LedgerError, Result};
use super::index::LedgerIndex;

const MAX_NAME_ATTEMPTS: usize = 16;

/// Durable per-job transfer ledger
///
/// Every entry lands in its own file,
/// `transfer_<YYYYmmdd_HHMMSS_micros>_<seq>_<file_name>.json`, opened with
/// create-new semantics so an existing record is never overwritten. Entries
/// are also written to a [`LedgerIndex`] for lookups.
pub struct TransferLedger {
    dir: PathBuf,
    index: LedgerIndex,
    seq: AtomicU64,
}

impl TransferLedger {
    pub fn open(dir: impl Into<PathBuf>, index_path: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let index = LedgerIndex::open(index_path)?;
        info!(dir = %dir.display(), "Transfer ledger ready");
        Ok(Self {
            dir,
            index,
            seq: AtomicU64::new(0),
        })
    }

    /// Persist one entry; safe to call from many workers at once
    ///
    /// The file is the record of truth. An index failure after the file has
    /// been written is logged and does not fail the call.
    pub fn record(&self, entry: &LedgerEntry) -> Result<PathBuf> {
        let body = serde_json::to_vec_pretty(entry)?;
        let path = self.write_new_file(&entry.file_name, &body)?;

        if let Err(e) = self.index.insert(entry) {
            warn!(job_id = %entry.job_id, error = %e, "Ledger index update failed");
        }

        debug!(job_id = %entry.job_id, path = %path.display(), "Ledger entry written");
        Ok(path)
    }

    /// [`record`](Self::record) on the blocking pool, for callers on the runtime
    pub async fn record_async(self: &Arc<Self>, entry: &LedgerEntry) -> Result<PathBuf> {
        let ledger = Arc::clone(self);
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || ledger.record(&entry)).await?
    }

    pub fn get(&self, job_id: &Uuid) -> Result<Option<LedgerEntry>> {
        self.index.get(job_id)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.index.recent(limit)
    }

    pub fn persist(&self) -> Result<()> {
        self.index.persist()
    }

    fn write_new_file(&self, file_name: &str, body: &[u8]) -> Result<PathBuf> {
        let safe_name = sanitize(file_name);
        for _ in 0..MAX_NAME_ATTEMPTS {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
            let path = self
                .dir
                .join(format!("transfer_{stamp}_{seq:06}_{safe_name}.json"));

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(body)?;
            file.sync_all()?;
            return Ok(path);
        }
        Err(LedgerError::NameExhausted(self.dir.clone()))
    }
}

/// Keep a file name usable as part of a ledger file name
fn sanitize(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

#[cfg(test)]
impl TransferLedger {
    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }
}
