/// Transfer ledger: durable per-job delivery outcomes
///
/// The ledger is the single source of truth for "was this file delivered,
/// and to whom". It is made of:
///
/// - One JSON file per job in `log_dir`, written once with create-new
///   semantics and never merged or overwritten
/// - A Fjall index (`jobs` partition keyed by UUIDv7 job id) for operator
///   lookups by id and "most recent N" listings
/// - A human-readable event log of lifecycle transitions
///   (detected → dispatching → completed)
///
/// ## Usage
///
/// ```rust,ignore
/// use relaybox::ledger::TransferLedger;
///
/// let ledger = TransferLedger::open("logs", "logs/index")?;
/// let path = ledger.record(&entry)?;
/// let latest = ledger.recent(10)?;
/// ```

pub mod entry;
pub mod error;
pub mod events;
pub mod index;
pub mod partitions;
pub mod store;

pub use entry::{DeliveryRecord, DeliveryStatus, LedgerEntry};
pub use error::{LedgerError, Result};
pub use events::{EventLog, RelayEvent};
pub use index::LedgerIndex;
pub use store::TransferLedger;
