use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::ConfigError;

/// Where a job's source file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ingress {
    /// Dropped into the landing directory
    Watcher,
    /// Pushed over the TCP receiver
    Network,
    /// Injected by an operator
    Manual,
    /// One file of an extracted bundle
    Bundle,
}

impl fmt::Display for Ingress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Ingress::Watcher => "watcher",
            Ingress::Network => "network",
            Ingress::Manual => "manual",
            Ingress::Bundle => "bundle",
        };
        f.write_str(label)
    }
}

/// One detected source file and the destinations it is bound for
///
/// Immutable once created; `resolved_targets` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayJob {
    pub job_id: Uuid,
    pub source_path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub detected_at: DateTime<Utc>,
    pub resolved_targets: Vec<String>,
    pub ingress: Ingress,
}

impl RelayJob {
    /// Create a job, failing if the file has no usable name or no targets
    pub fn new(
        source_path: impl Into<PathBuf>,
        size_bytes: u64,
        ingress: Ingress,
        resolved_targets: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let source_path = source_path.into();
        let file_name = file_name_of(&source_path)?;

        if resolved_targets.is_empty() {
            return Err(ConfigError::NoTargets(file_name));
        }

        Ok(Self {
            job_id: Uuid::now_v7(),
            source_path,
            file_name,
            size_bytes,
            detected_at: Utc::now(),
            resolved_targets,
            ingress,
        })
    }
}

pub(crate) fn file_name_of(path: &Path) -> Result<String, ConfigError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| ConfigError::NoFileName(path.to_path_buf()))
}
