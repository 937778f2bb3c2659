//! Relay worker pool
//!
//! Workers receive jobs from the broker's channels, copy the source file to
//! the outgoing archive, fan it out to its destinations and write the ledger
//! entry.

pub mod dispatcher;
pub mod inflight;
mod job;
pub mod runner;

pub use dispatcher::Dispatcher;
pub use inflight::{InFlight, PendingJob};
pub use job::{Ingress, RelayJob};
pub(crate) use job::file_name_of;
pub use runner::{RelayContext, process_job, run_worker};
