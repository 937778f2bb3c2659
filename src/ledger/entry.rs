//! Persisted ledger record types
//!
//! The JSON shape keeps the gateway's transfer-log format (`file_name`,
//! `file_size`, `timestamp`, `source`, `targets`, `destinations[]` with
//! `device`/`ip`/`target_path`/`status`/`timestamp`) and adds `job_id`,
//! `ingress` and `detected_at`.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::worker::{Ingress, RelayJob};

const SUCCESS: &str = "success";
const FAILED_PREFIX: &str = "failed: ";

/// Terminal outcome of one delivery, written as `"success"` or `"failed: <reason>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Failed(String),
}

impl DeliveryStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryStatus::Success)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Success => f.write_str(SUCCESS),
            DeliveryStatus::Failed(reason) => write!(f, "{FAILED_PREFIX}{reason}"),
        }
    }
}

impl Serialize for DeliveryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeliveryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == SUCCESS {
            Ok(DeliveryStatus::Success)
        } else if let Some(reason) = raw.strip_prefix(FAILED_PREFIX) {
            Ok(DeliveryStatus::Failed(reason.to_string()))
        } else if raw == "failed" {
            Ok(DeliveryStatus::Failed(String::new()))
        } else {
            Err(D::Error::custom(format!("unknown delivery status '{raw}'")))
        }
    }
}

/// Outcome for one targeted destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    #[serde(rename = "device")]
    pub destination: String,
    #[serde(rename = "ip")]
    pub address: String,
    /// Remote path written, or the path that would have been written
    pub target_path: String,
    pub status: DeliveryStatus,
    #[serde(rename = "timestamp")]
    pub completed_at: DateTime<Utc>,
}

/// One job and the outcome for every destination it targeted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub job_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    /// When the entry was produced
    pub timestamp: DateTime<Utc>,
    /// Path the file was relayed from
    pub source: String,
    pub ingress: Ingress,
    pub detected_at: DateTime<Utc>,
    pub targets: Vec<String>,
    pub destinations: Vec<DeliveryRecord>,
}

impl LedgerEntry {
    pub fn new(job: &RelayJob, destinations: Vec<DeliveryRecord>) -> Self {
        Self {
            job_id: job.job_id,
            file_name: job.file_name.clone(),
            file_size: job.size_bytes,
            timestamp: Utc::now(),
            source: job.source_path.display().to_string(),
            ingress: job.ingress,
            detected_at: job.detected_at,
            targets: job.resolved_targets.clone(),
            destinations,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.destinations.iter().filter(|d| d.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.destinations.len() - self.succeeded()
    }

    pub fn record_for(&self, destination: &str) -> Option<&DeliveryRecord> {
        self.destinations.iter().find(|d| d.destination == destination)
    }
}
