//! Sync orchestration: task registry, work-list building, worker pool and
//! scheduler.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `SyncKind`, `SyncStatus`, `SyncOptions`, constants
//! - [`task`] - Per-task state machine and `TaskSnapshot`
//! - [`registry`] - `TaskRegistry`: create, get, cancel, list
//! - [`engine`] - Work-list builders and the per-task run flow
//! - [`scheduler`] - Wall-clock aligned incremental syncs
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//!
//! # Example
//!
//! ```ignore
//! use crmsync::sync::{SyncKind, TaskRegistry};
//!
//! let registry = TaskRegistry::builder()
//!     .fetcher(fetcher)
//!     .store(store)
//!     .build()?;
//! let id = registry.create(SyncKind::Full)?;
//! ```

pub mod engine;
mod error;
mod pool;
mod progress;
pub mod registry;
pub mod scheduler;
mod task;
mod types;

// Re-export types
pub use types::{
    EntityType, SyncKind, SyncOptions, SyncStatus, TaskId, UnitFailure, UnitOutcome, WorkItem,
};

// Re-export constants
pub use types::{
    DEFAULT_RATE_LIMIT_RETRIES, DEFAULT_SCHEDULE_INTERVAL_MINUTES, DEFAULT_STALE_AFTER_HOURS,
    DEFAULT_UNIT_TIMEOUT_SECS, DEFAULT_WORKER_COUNT, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
    MAX_RECENT_FAILURES, PROGRESS_LOG_INTERVAL,
};

pub use error::{Result, SyncError};
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use task::{Counters, SyncTask, TaskSnapshot, progress_percent};

pub use engine::{
    WorkList, build_full_work_list, build_group_work_list, build_incremental_work_list,
};
pub use registry::{RegistryBuildError, TaskRegistry, TaskRegistryBuilder};
pub use scheduler::{Scheduler, SchedulerOptions, next_tick_after};
