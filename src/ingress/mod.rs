//! Ingress sources: landing-directory watcher, TCP receiver, manual bundles
//!
//! Every source hands completed files to the shared
//! [`JobIntake`](crate::queue::JobIntake); none of them talk to the
//! dispatcher directly.

pub mod bundle;
pub mod client;
pub mod protocol;
pub mod receiver;
pub mod watcher;

pub use bundle::{BUNDLE_METADATA_FILE, BundleReport, relay_bundle};
pub use client::push_file;
pub use protocol::{FileHeader, ProtocolError};
pub use receiver::{ReceiverHandle, ReceiverSettings, spawn_receiver};
pub use watcher::{WatcherHandle, spawn_watcher};

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Directory '{path}' unavailable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot bind receiver on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
