//! Per-task state machine and its immutable snapshot.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::types::{MAX_RECENT_FAILURES, SyncKind, SyncStatus, TaskId, UnitFailure, UnitOutcome};

/// Running totals after a unit has been recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub total: usize,
    pub processed: usize,
    pub added: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Live state of one sync run, owned by the registry and mutated only under
/// its lock.
///
/// Every transition method is a no-op once the task is terminal.
#[derive(Debug)]
pub struct SyncTask {
    id: TaskId,
    kind: SyncKind,
    status: SyncStatus,
    total: Option<usize>,
    processed: usize,
    added: usize,
    updated: usize,
    failed: usize,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    recent_failures: VecDeque<UnitFailure>,
    cancel: CancellationToken,
}

impl SyncTask {
    pub fn new(id: TaskId, kind: SyncKind) -> Self {
        Self {
            id,
            kind,
            status: SyncStatus::Pending,
            total: None,
            processed: 0,
            added: 0,
            updated: 0,
            failed: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error_message: None,
            recent_failures: VecDeque::with_capacity(MAX_RECENT_FAILURES),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// The task's cancellation token (clones share state).
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// `Pending -> Running`.
    pub fn mark_running(&mut self) -> bool {
        if self.status != SyncStatus::Pending {
            return false;
        }
        self.status = SyncStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Fix the size of the work list. Only the first call while running wins.
    pub fn set_total(&mut self, total: usize) -> bool {
        if self.status != SyncStatus::Running || self.total.is_some() {
            return false;
        }
        self.total = Some(total);
        true
    }

    /// Count one finished unit.
    ///
    /// Refused once the token is cancelled so `processed` cannot grow after a
    /// successful `cancel`.
    pub fn record(&mut self, entity_id: &str, outcome: &UnitOutcome) -> Option<Counters> {
        if self.status != SyncStatus::Running || self.cancel.is_cancelled() {
            return None;
        }
        self.processed += 1;
        match outcome {
            UnitOutcome::Added => self.added += 1,
            UnitOutcome::Updated => self.updated += 1,
            UnitOutcome::Failed(error) => {
                self.failed += 1;
                if self.recent_failures.len() == MAX_RECENT_FAILURES {
                    self.recent_failures.pop_front();
                }
                self.recent_failures.push_back(UnitFailure {
                    entity_id: entity_id.to_string(),
                    error: error.clone(),
                });
            }
        }
        Some(self.counters())
    }

    /// Move to a terminal status. `error` is kept only for `Failed`.
    pub fn finish(&mut self, status: SyncStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        if status == SyncStatus::Failed {
            self.error_message = Some(error.unwrap_or_else(|| "unknown error".to_string()));
        }
        true
    }

    /// Cancel the token unless the task already ended.
    pub fn request_cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn counters(&self) -> Counters {
        Counters {
            total: self.total.unwrap_or(0),
            processed: self.processed,
            added: self.added,
            updated: self.updated,
            failed: self.failed,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let total = self.total.unwrap_or(0);
        TaskSnapshot {
            id: self.id,
            kind: self.kind,
            status: self.status,
            total_count: total,
            processed_count: self.processed,
            added_count: self.added,
            updated_count: self.updated,
            failed_count: self.failed,
            progress_percent: progress_percent(self.processed, total, self.status),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            error_message: self.error_message.clone(),
            recent_failures: self.recent_failures.iter().cloned().collect(),
        }
    }
}

/// `processed / total * 100`, clamped to 100.
///
/// An empty work list reports 100 once the task completed and 0 before.
pub fn progress_percent(processed: usize, total: usize, status: SyncStatus) -> u8 {
    if total == 0 {
        return if status == SyncStatus::Completed { 100 } else { 0 };
    }
    (processed.saturating_mul(100) / total).min(100) as u8
}

/// Immutable copy of a task handed out by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub kind: SyncKind,
    pub status: SyncStatus,
    pub total_count: usize,
    pub processed_count: usize,
    pub added_count: usize,
    pub updated_count: usize,
    pub failed_count: usize,
    pub progress_percent: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Present only when `status == Failed`.
    pub error_message: Option<String>,
    /// Last few unit failures, oldest first.
    pub recent_failures: Vec<UnitFailure>,
}

impl TaskSnapshot {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
