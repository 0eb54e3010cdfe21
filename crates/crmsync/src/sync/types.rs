//! Shared sync types and constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::{EntityId, Owner};

/// Default number of concurrent fetch+upsert units per task.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Customers not refreshed within this many hours are re-fetched by an
/// incremental sync.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 6;

/// Deadline for each individual fetch and each upsert.
pub const DEFAULT_UNIT_TIMEOUT_SECS: u64 = 30;

/// Retries granted to a call the platform rejected as rate limited.
pub const DEFAULT_RATE_LIMIT_RETRIES: usize = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Maximum backoff delay in milliseconds when rate limited.
pub const MAX_BACKOFF_MS: u64 = 8_000;

/// Emit a progress line every this many completed units (and on the first).
pub const PROGRESS_LOG_INTERVAL: usize = 5;

/// Unit failures kept on a task for diagnostics.
pub const MAX_RECENT_FAILURES: usize = 10;

/// Default scheduler cadence.
pub const DEFAULT_SCHEDULE_INTERVAL_MINUTES: u32 = 60;

/// Opaque task identifier.
pub type TaskId = Uuid;

/// What a task synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Every customer of every owner.
    Full,
    /// New customers plus customers whose row went stale.
    Incremental,
    /// Every customer group chat.
    GroupSync,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Full => write!(f, "full"),
            SyncKind::Incremental => write!(f, "incremental"),
            SyncKind::GroupSync => write!(f, "groups"),
        }
    }
}

/// Task lifecycle: `Pending -> Running -> {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    /// Terminal states never change again.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Running => write!(f, "running"),
            SyncStatus::Completed => write!(f, "completed"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customer,
    Group,
}

/// One unit of work for the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub remote_id: EntityId,
    /// Owner the customer id was enumerated under; `None` for groups.
    pub owner_hint: Option<Owner>,
    pub entity_type: EntityType,
}

impl WorkItem {
    pub fn customer(remote_id: impl Into<EntityId>, owner: Owner) -> Self {
        Self {
            remote_id: remote_id.into(),
            owner_hint: Some(owner),
            entity_type: EntityType::Customer,
        }
    }

    pub fn group(remote_id: impl Into<EntityId>) -> Self {
        Self {
            remote_id: remote_id.into(),
            owner_hint: None,
            entity_type: EntityType::Group,
        }
    }
}

/// Result of one fetch+upsert unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Added,
    Updated,
    /// The unit failed; carries a one-line reason.
    Failed(String),
}

/// A unit failure kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub entity_id: EntityId,
    pub error: String,
}

/// Knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Concurrent units per task.
    pub worker_count: usize,
    /// Staleness window for incremental syncs.
    pub stale_after: chrono::Duration,
    /// Deadline for each fetch and each upsert.
    pub unit_timeout: Duration,
    /// Retries on rate-limit responses (0 disables retrying).
    pub rate_limit_retries: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            stale_after: chrono::Duration::hours(DEFAULT_STALE_AFTER_HOURS),
            unit_timeout: Duration::from_secs(DEFAULT_UNIT_TIMEOUT_SECS),
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
        }
    }
}
