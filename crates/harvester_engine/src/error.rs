use harvester_core::RunStats;
use thiserror::Error;

use crate::page::DriverError;
use crate::persist::PersistError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("invalid listing url {url}: {reason}")]
    InvalidListingUrl { url: String, reason: String },
    #[error("browser driver: {0}")]
    Driver(#[from] DriverError),
    #[error("persistence: {0}")]
    Persist(#[from] PersistError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("listing did not load: {0}")]
    InitialLoad(String),
    #[error("gave up after {attempts} attempts: {last_error}")]
    RestartsExhausted {
        attempts: u32,
        last_error: String,
        stats: Option<RunStats>,
    },
}

impl HarvestError {
    /// Statistics of the last attempt, when the run got that far.
    pub fn partial_stats(&self) -> Option<&RunStats> {
        match self {
            HarvestError::RestartsExhausted { stats, .. } => stats.as_ref(),
            _ => None,
        }
    }
}

/// One collection attempt that failed, with what it managed before failing.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct AttemptFailure {
    pub error: HarvestError,
    pub stats: RunStats,
}
