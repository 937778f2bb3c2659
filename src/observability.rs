//! Observability: tracing setup and in-process relay counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call more than once; only
/// the first call installs a subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Metrics handle for recording relay counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_detected: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_rejected: AtomicU64,
    deliveries_succeeded: AtomicU64,
    deliveries_failed: AtomicU64,
    connections_accepted: AtomicU64,
    protocol_errors: AtomicU64,
    archive_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_detected(&self) {
        self.jobs_detected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_detected", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    /// A job that could not be created or queued
    pub fn job_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_rejected", "Metric incremented");
    }

    pub fn delivery(&self, succeeded: bool) {
        if succeeded {
            self.deliveries_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "protocol_errors", "Metric incremented");
    }

    pub fn archive_failed(&self) {
        self.archive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_detected: self.jobs_detected.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            archive_failures: self.archive_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_detected: u64,
    pub jobs_completed: u64,
    pub jobs_rejected: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    pub connections_accepted: u64,
    pub protocol_errors: u64,
    pub archive_failures: u64,
}
