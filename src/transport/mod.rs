//! Single-file push to one destination
//!
//! A [`Transport`] moves one local file into one destination's remote root.
//! It never retries and never panics on remote failures: every problem comes
//! back as a [`TransferError`] that the dispatcher records for that
//! destination alone.

mod sftp;

pub use sftp::SftpTransport;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::{LimitsConfig, SecretError};
use crate::routing::Destination;

/// Caller-supplied bounds for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub connect_timeout: Duration,
    /// Upper bound for the whole transfer, connect included
    pub timeout: Duration,
}

impl SendOptions {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            connect_timeout: limits.connect_timeout(),
            timeout: limits.transfer_timeout(),
        }
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("ssh handshake with {endpoint} failed: {reason}")]
    Handshake { endpoint: String, reason: String },

    #[error("authentication failed for user {user}")]
    Auth { user: String },

    #[error("credential unavailable: {0}")]
    Credential(#[from] SecretError),

    #[error("cannot create remote directory {path}: {reason}")]
    RemoteDir { path: String, reason: String },

    #[error("remote write to {path} failed: {reason}")]
    RemoteWrite { path: String, reason: String },

    #[error("local file {path} unreadable: {source}")]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid local file name: {0}")]
    InvalidFileName(PathBuf),

    #[error("transfer timed out after {0:?}")]
    Timeout(Duration),

    #[error("transfer aborted: {0}")]
    Aborted(String),
}

impl TransferError {
    /// Single-line reason as written to the ledger
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Pushes one local file into a destination's remote root
///
/// Implementations connect with the destination's credential, create the
/// remote root if missing, upload under the file's base name and release the
/// connection on every path. Returns the remote path written.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        local: &Path,
        destination: &Destination,
        options: &SendOptions,
    ) -> Result<String, TransferError>;
}

/// Base name of `local` as UTF-8, the name it keeps on the remote side
pub(crate) fn remote_file_name(local: &Path) -> Result<&str, TransferError> {
    local
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| TransferError::InvalidFileName(local.to_path_buf()))
}
