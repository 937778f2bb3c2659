//! Request and response bodies of the operator HTTP API
//!
//! Status, configuration, stop reports and ledger entries are served with
//! their own `Serialize` implementations; this module only holds the shapes
//! that exist for the HTTP surface alone.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::ingress::BundleReport;

pub const DEFAULT_LEDGER_LIMIT: usize = 50;
pub const MAX_LEDGER_LIMIT: usize = 1000;

/// `POST /api/send-file/`
#[derive(Debug, Deserialize)]
pub struct SendFileRequest {
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendFileResponse {
    pub message: String,
    pub job_id: Uuid,
    pub file_name: String,
    pub targets: Vec<String>,
}

/// `POST /api/relay-bundle/`
#[derive(Debug, Deserialize)]
pub struct BundleRequest {
    #[serde(default)]
    pub bundle_dir: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BundleResponse {
    pub bundle_dir: PathBuf,
    #[serde(flatten)]
    pub report: BundleReport,
}

/// `GET /api/ledger/?limit=N`
#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<usize>,
}

impl LedgerQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LEDGER_LIMIT).clamp(1, MAX_LEDGER_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse<T: Serialize> {
    pub message: String,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active: bool,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    #[serde(rename = "error")]
    pub message: String,
}
