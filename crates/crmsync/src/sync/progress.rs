//! Progress reporting types for sync tasks.
//!
//! Events are fire-and-forget: the orchestrator calls the callback inline, so
//! callbacks must be cheap and must not block.

use super::types::{SyncKind, SyncStatus, TaskId};

/// Progress events emitted while tasks run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A task was accepted by the registry.
    TaskQueued { task_id: TaskId, kind: SyncKind },

    /// The background consumer picked the task up.
    TaskStarted { task_id: TaskId, kind: SyncKind },

    /// Owner enumeration finished.
    EnumeratedOwners { task_id: TaskId, owners: usize },

    /// The work list is final.
    WorkListReady {
        task_id: TaskId,
        total: usize,
        /// Remote ids left out by the incremental filter.
        skipped: usize,
    },

    /// Periodic counter update.
    UnitsProcessed {
        task_id: TaskId,
        processed: usize,
        total: usize,
        added: usize,
        updated: usize,
        failed: usize,
    },

    /// A single unit failed; the task keeps going.
    UnitFailed {
        task_id: TaskId,
        entity_id: String,
        error: String,
    },

    /// Rate limited, backing off before retry.
    RateLimitBackoff {
        entity_id: String,
        retry_after_ms: u64,
        attempt: u32,
    },

    /// The task reached a terminal status.
    TaskFinished {
        task_id: TaskId,
        status: SyncStatus,
        processed: usize,
        total: usize,
    },
}

/// Callback invoked for every [`SyncProgress`] event.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is present.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
