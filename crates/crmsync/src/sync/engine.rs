//! Work-list construction and the per-task run flow.
//!
//! The engine is owned by the registry's background consumer and runs one
//! task at a time:
//!
//! 1. `Pending -> Running`
//! 2. enumerate remote ids into a [`WorkList`] (failure fails the task)
//! 3. fix `total_count`
//! 4. drive the worker pool
//! 5. stamp the terminal status (and, for incremental runs, the sync time)

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::error::{Result, SyncError};
use super::pool::{self, PoolOutcome, UnitRunner};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::registry::TaskTable;
use super::types::{SyncKind, SyncOptions, SyncStatus, TaskId, WorkItem};
use crate::platform::{EntityFetcher, EntityId, Owner};
use crate::repository::EntityStore;
use crate::retry::{RetryConfig, with_retry};

/// Units to run for one task.
#[derive(Debug, Clone, Default)]
pub struct WorkList {
    pub items: Vec<WorkItem>,
    /// Owners enumerated (zero for group syncs).
    pub owners: usize,
    /// Remote ids the incremental filter left out.
    pub skipped: usize,
}

impl WorkList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Resolve `fut`, or fail with [`SyncError::Cancelled`] as soon as `cancel` fires.
async fn unless_cancelled<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    SyncError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result.map_err(SyncError::from),
    }
}

async fn list_owners(
    fetcher: &dyn EntityFetcher,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Owner>> {
    let listing = async {
        with_retry(|| fetcher.list_owners(), retry, "owners", None)
            .await
            .map_err(SyncError::Enumeration)
    };
    unless_cancelled(cancel, listing).await
}

async fn list_ids_for(
    fetcher: &dyn EntityFetcher,
    owner: &Owner,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<EntityId>> {
    let listing = async {
        with_retry(
            || fetcher.list_entity_ids_for_owner(owner),
            retry,
            &owner.userid,
            None,
        )
        .await
        .map_err(SyncError::Enumeration)
    };
    unless_cancelled(cancel, listing).await
}

/// Every customer of every owner, tagged with the owner that listed it.
///
/// Ids listed by several owners appear once per owner.
pub async fn build_full_work_list(
    fetcher: &dyn EntityFetcher,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<WorkList> {
    let owners = list_owners(fetcher, retry, cancel).await?;
    if owners.is_empty() {
        tracing::warn!("No owners returned by the platform");
    }

    let mut list = WorkList {
        owners: owners.len(),
        ..WorkList::default()
    };
    for owner in &owners {
        let ids = list_ids_for(fetcher, owner, retry, cancel).await?;
        tracing::debug!(owner = %owner.userid, count = ids.len(), "Listed customers");
        list.items
            .extend(ids.into_iter().map(|id| WorkItem::customer(id, owner.clone())));
    }
    Ok(list)
}

/// Customers that are new locally or whose row is older than `threshold`.
pub async fn build_incremental_work_list(
    fetcher: &dyn EntityFetcher,
    store: &dyn EntityStore,
    threshold: DateTime<Utc>,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<WorkList> {
    let stale: HashSet<EntityId> = unless_cancelled(cancel, store.stale_ids(threshold)).await?;
    let known: HashSet<EntityId> = unless_cancelled(cancel, store.known_ids()).await?;
    tracing::debug!(
        stale = stale.len(),
        known = known.len(),
        %threshold,
        "Loaded local customer ids"
    );

    let owners = list_owners(fetcher, retry, cancel).await?;
    if owners.is_empty() {
        tracing::warn!("No owners returned by the platform");
    }

    let mut list = WorkList {
        owners: owners.len(),
        ..WorkList::default()
    };
    for owner in &owners {
        for id in list_ids_for(fetcher, owner, retry, cancel).await? {
            if stale.contains(&id) || !known.contains(&id) {
                list.items.push(WorkItem::customer(id, owner.clone()));
            } else {
                list.skipped += 1;
            }
        }
    }
    Ok(list)
}

/// Every customer group chat.
pub async fn build_group_work_list(
    fetcher: &dyn EntityFetcher,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<WorkList> {
    let listing = async {
        with_retry(|| fetcher.list_group_ids(), retry, "groups", None)
            .await
            .map_err(SyncError::Enumeration)
    };
    let ids = unless_cancelled(cancel, listing).await?;
    Ok(WorkList {
        items: ids.into_iter().map(WorkItem::group).collect(),
        ..WorkList::default()
    })
}

/// Runs queued tasks against one fetcher/store pair.
pub(crate) struct SyncEngine {
    fetcher: Arc<dyn EntityFetcher>,
    store: Arc<dyn EntityStore>,
    options: SyncOptions,
    retry: RetryConfig,
    tasks: Arc<TaskTable>,
    runner: Arc<UnitRunner>,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl SyncEngine {
    pub(crate) fn new(
        fetcher: Arc<dyn EntityFetcher>,
        store: Arc<dyn EntityStore>,
        options: SyncOptions,
        tasks: Arc<TaskTable>,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Self {
        let retry = RetryConfig::with_max_retries(options.rate_limit_retries);
        let runner = Arc::new(UnitRunner::new(
            Arc::clone(&fetcher),
            Arc::clone(&store),
            options.unit_timeout,
            retry.clone(),
            on_progress.clone(),
        ));
        Self {
            fetcher,
            store,
            options,
            retry,
            tasks,
            runner,
            on_progress,
        }
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_deref()
    }

    /// Run one task to a terminal status.
    ///
    /// Tasks that are no longer pending are skipped. A task whose token fired
    /// while it was queued finishes `Cancelled` without touching the platform,
    /// and any error raised after the token fired is reported as a cancel.
    #[tracing::instrument(skip(self), fields(kind = tracing::field::Empty))]
    pub(crate) async fn run_task(&self, task_id: TaskId) {
        let started = self
            .tasks
            .with(task_id, |t| {
                t.mark_running()
                    .then(|| (t.kind(), t.cancel_token().clone()))
            })
            .flatten();
        let Some((kind, cancel)) = started else {
            tracing::debug!("Task is no longer pending, skipping");
            return;
        };
        tracing::Span::current().record("kind", tracing::field::display(kind));
        tracing::info!("Sync task started");
        emit(self.progress(), SyncProgress::TaskStarted { task_id, kind });

        let run_started_at = Utc::now();
        let result = if cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            self.execute(task_id, kind, &cancel, run_started_at).await
        };
        let (status, error) = match result {
            Ok(status) => (status, None),
            Err(SyncError::Cancelled) => (SyncStatus::Cancelled, None),
            Err(e) if cancel.is_cancelled() => {
                tracing::debug!(error = %e, "Error after cancellation ignored");
                (SyncStatus::Cancelled, None)
            }
            Err(e) => {
                tracing::error!(error = %e, "Sync task failed");
                (SyncStatus::Failed, Some(e.to_string()))
            }
        };

        let counters = self
            .tasks
            .with(task_id, |t| {
                t.finish(status, error);
                t.counters()
            })
            .unwrap_or_default();

        tracing::info!(
            %status,
            total = counters.total,
            processed = counters.processed,
            added = counters.added,
            updated = counters.updated,
            failed = counters.failed,
            "Sync task finished"
        );
        emit(
            self.progress(),
            SyncProgress::TaskFinished {
                task_id,
                status,
                processed: counters.processed,
                total: counters.total,
            },
        );
    }

    async fn execute(
        &self,
        task_id: TaskId,
        kind: SyncKind,
        cancel: &CancellationToken,
        run_started_at: DateTime<Utc>,
    ) -> Result<SyncStatus> {
        let fetcher = self.fetcher.as_ref();
        let list = match kind {
            SyncKind::Full => build_full_work_list(fetcher, &self.retry, cancel).await?,
            SyncKind::Incremental => {
                let last = unless_cancelled(cancel, self.store.last_sync_time()).await?;
                let threshold = run_started_at - self.options.stale_after;
                tracing::debug!(last_sync = ?last, %threshold, "Incremental window");
                build_incremental_work_list(
                    fetcher,
                    self.store.as_ref(),
                    threshold,
                    &self.retry,
                    cancel,
                )
                .await?
            }
            SyncKind::GroupSync => build_group_work_list(fetcher, &self.retry, cancel).await?,
        };

        if kind != SyncKind::GroupSync {
            emit(
                self.progress(),
                SyncProgress::EnumeratedOwners {
                    task_id,
                    owners: list.owners,
                },
            );
        }

        let total = list.len();
        self.tasks.with(task_id, |t| t.set_total(total));
        tracing::info!(total, skipped = list.skipped, "Work list ready");
        emit(
            self.progress(),
            SyncProgress::WorkListReady {
                task_id,
                total,
                skipped: list.skipped,
            },
        );

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let outcome = pool::run(
            task_id,
            list.items,
            self.options.worker_count,
            cancel,
            Arc::clone(&self.runner),
            &self.tasks,
            self.progress(),
        )
        .await;

        if outcome == PoolOutcome::Cancelled {
            return Err(SyncError::Cancelled);
        }

        if kind == SyncKind::Incremental
            && let Err(e) = self.store.set_last_sync_time(run_started_at).await
        {
            tracing::warn!(error = %e, "Failed to persist last sync time");
        }

        Ok(SyncStatus::Completed)
    }
}
