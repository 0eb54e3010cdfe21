use std::time::Duration;

use thiserror::Error;

use crate::platform::FetchError;
use crate::repository::RepositoryError;

/// Errors raised by the sync orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Owner, customer-id or group-id listing failed; the task cannot start.
    #[error("Enumeration failed: {0}")]
    Enumeration(#[source] FetchError),

    /// A detail fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The local store failed.
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),

    /// The local store did not answer within the unit deadline.
    #[error("Store call timed out after {elapsed:?}")]
    StoreTimeout { elapsed: Duration },

    /// The task was cancelled before it finished.
    #[error("Task was cancelled")]
    Cancelled,

    /// The registry's background consumer is gone.
    #[error("Task queue is closed")]
    QueueClosed,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
