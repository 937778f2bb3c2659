/// Key layout for the ledger index
///
/// Partition structure:
/// - `jobs`: job:{job_id} -> LedgerEntry (JSON)
///
/// Job ids are UUIDv7 in hyphenated lowercase form, so lexicographic key
/// order is creation order and a reverse prefix scan yields the newest jobs.
use uuid::Uuid;

pub const JOBS_PARTITION: &str = "jobs";
pub const JOB_KEY_PREFIX: &str = "job:";

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &Uuid) -> Vec<u8> {
    format!("{}{}", JOB_KEY_PREFIX, job_id.as_hyphenated()).into_bytes()
}
