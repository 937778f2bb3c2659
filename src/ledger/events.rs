use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::worker::RelayJob;

/// Job lifecycle transitions written to the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    Detected,
    Dispatching,
    Completed,
    ArchiveFailed,
    LedgerFailed,
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelayEvent::Detected => "detected",
            RelayEvent::Dispatching => "dispatching",
            RelayEvent::Completed => "completed",
            RelayEvent::ArchiveFailed => "archive_failed",
            RelayEvent::LedgerFailed => "ledger_failed",
        };
        f.write_str(label)
    }
}

/// Human-readable, append-only lifecycle log
///
/// One line per transition in `<log_dir>/relay_events_<YYYYMMDD>.log`, the
/// file rolling over by UTC date. Write failures are logged and swallowed:
/// losing a lifecycle line must not affect a relay.
#[derive(Debug)]
pub struct EventLog {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path_for(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("relay_events_{}.log", at.format("%Y%m%d")))
    }

    pub async fn emit(&self, event: RelayEvent, job: &RelayJob, detail: &str) {
        let now = Utc::now();
        let mut line = format!(
            "{} {} job={} file={} size={} ingress={}",
            now.to_rfc3339(),
            event,
            job.job_id,
            job.file_name,
            job.size_bytes,
            job.ingress
        );
        if !detail.is_empty() {
            line.push(' ');
            line.push_str(detail);
        }
        line.push('\n');

        if let Err(e) = self.append(&self.path_for(now), &line).await {
            warn!(event = %event, job_id = %job.job_id, error = %e, "Event log write failed");
        }
    }

    async fn append(&self, path: &Path, line: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock().await;
        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
