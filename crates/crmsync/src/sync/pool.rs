//! Bounded fan-out of fetch+upsert units.
//!
//! The driver loop owns dispatch and bookkeeping: it acquires a semaphore
//! permit per unit, spawns the unit onto a `JoinSet`, and records every
//! finished unit into the task under the registry lock. Cancellation stops
//! dispatch immediately and abandons whatever is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::error::{Result, SyncError};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::registry::TaskTable;
use super::types::{EntityType, PROGRESS_LOG_INTERVAL, TaskId, UnitOutcome, WorkItem};
use crate::platform::{
    CustomerRecord, EntityFetcher, EntityId, EntityRecord, FetchError, GroupRecord,
    short_error_message,
};
use crate::repository::{EntityStore, UpsertOutcome};
use crate::retry::{RetryConfig, with_retry};

/// How a pool run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolOutcome {
    /// Every unit ran.
    Completed,
    /// The token fired; remaining units were never started.
    Cancelled,
}

/// Executes a single work item: fetch detail, map, upsert.
pub(crate) struct UnitRunner {
    fetcher: Arc<dyn EntityFetcher>,
    store: Arc<dyn EntityStore>,
    unit_timeout: Duration,
    retry: RetryConfig,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl UnitRunner {
    pub(crate) fn new(
        fetcher: Arc<dyn EntityFetcher>,
        store: Arc<dyn EntityStore>,
        unit_timeout: Duration,
        retry: RetryConfig,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Self {
        Self {
            fetcher,
            store,
            unit_timeout,
            retry,
            on_progress,
        }
    }

    pub(crate) async fn process(&self, item: &WorkItem) -> UnitOutcome {
        match self.try_process(item).await {
            Ok(UpsertOutcome::Inserted) => UnitOutcome::Added,
            Ok(UpsertOutcome::Updated) => UnitOutcome::Updated,
            Err(e) => UnitOutcome::Failed(short_error_message(&e)),
        }
    }

    async fn try_process(&self, item: &WorkItem) -> Result<UpsertOutcome> {
        let id = &item.remote_id;
        let record = match item.entity_type {
            EntityType::Customer => {
                let detail = self
                    .fetch(id, || self.fetcher.fetch_customer_detail(id))
                    .await?;
                EntityRecord::Customer(CustomerRecord::from_detail(
                    &detail,
                    item.owner_hint.as_ref(),
                ))
            }
            EntityType::Group => {
                let detail = self.fetch(id, || self.fetcher.fetch_group_detail(id)).await?;
                EntityRecord::Group(GroupRecord::from_detail(&detail))
            }
        };

        match tokio::time::timeout(self.unit_timeout, self.store.upsert(&record)).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Err(SyncError::StoreTimeout {
                elapsed: self.unit_timeout,
            }),
        }
    }

    /// One remote call under the unit deadline, retried only on rate limiting.
    async fn fetch<T, F, Fut>(&self, id: &str, mut call: F) -> std::result::Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>>,
    {
        let limit = self.unit_timeout;
        with_retry(
            || {
                let fut = call();
                async move {
                    tokio::time::timeout(limit, fut)
                        .await
                        .unwrap_or(Err(FetchError::Timeout { elapsed: limit }))
                }
            },
            &self.retry,
            id,
            self.on_progress.as_deref(),
        )
        .await
    }
}

type Joined = std::result::Result<(EntityId, Option<UnitOutcome>), JoinError>;

/// Run `items` through `runner` with at most `worker_count` units in flight.
pub(crate) async fn run(
    task_id: TaskId,
    items: Vec<WorkItem>,
    worker_count: usize,
    cancel: &CancellationToken,
    runner: Arc<UnitRunner>,
    tasks: &TaskTable,
    on_progress: Option<&ProgressCallback>,
) -> PoolOutcome {
    let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
    let mut in_flight: JoinSet<(EntityId, Option<UnitOutcome>)> = JoinSet::new();
    let mut queue = items.into_iter();
    let mut next = queue.next();

    let settle = |joined: Joined| {
        let (entity_id, outcome) = match joined {
            Ok((_, None)) => return,
            Ok((entity_id, Some(outcome))) => (entity_id, outcome),
            Err(e) => (
                "<unknown>".to_string(),
                UnitOutcome::Failed(format!("Worker task failed: {e}")),
            ),
        };
        record_unit(task_id, &entity_id, &outcome, tasks, on_progress);
    };

    let outcome = loop {
        if cancel.is_cancelled() {
            break PoolOutcome::Cancelled;
        }

        match next.take() {
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break PoolOutcome::Cancelled,
                    joined = in_flight.join_next() => match joined {
                        Some(joined) => settle(joined),
                        None => break PoolOutcome::Completed,
                    },
                }
            }
            Some(item) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break PoolOutcome::Cancelled,
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        next = Some(item);
                        settle(joined);
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        next = queue.next();
                        let permit = match permit {
                            Ok(permit) => permit,
                            Err(_) => {
                                let failed =
                                    UnitOutcome::Failed("Semaphore closed unexpectedly".to_string());
                                record_unit(task_id, &item.remote_id, &failed, tasks, on_progress);
                                continue;
                            }
                        };
                        if cancel.is_cancelled() {
                            break PoolOutcome::Cancelled;
                        }

                        let runner = Arc::clone(&runner);
                        let token = cancel.clone();
                        in_flight.spawn(async move {
                            let _permit = permit;
                            let outcome = tokio::select! {
                                biased;
                                _ = token.cancelled() => None,
                                outcome = runner.process(&item) => Some(outcome),
                            };
                            (item.remote_id, outcome)
                        });
                    }
                }
            }
        }
    };

    if outcome == PoolOutcome::Cancelled {
        let abandoned = in_flight.len();
        in_flight.shutdown().await;
        tracing::info!(%task_id, abandoned, "Sync task cancelled, in-flight units abandoned");
    }

    outcome
}

fn record_unit(
    task_id: TaskId,
    entity_id: &str,
    outcome: &UnitOutcome,
    tasks: &TaskTable,
    on_progress: Option<&ProgressCallback>,
) {
    let Some(counters) = tasks.with(task_id, |t| t.record(entity_id, outcome)).flatten() else {
        return;
    };

    if let UnitOutcome::Failed(error) = outcome {
        tracing::warn!(%task_id, entity_id, error = %error, "Sync unit failed");
        emit(
            on_progress,
            SyncProgress::UnitFailed {
                task_id,
                entity_id: entity_id.to_string(),
                error: error.clone(),
            },
        );
    }

    let processed = counters.processed;
    if processed == 1 || processed % PROGRESS_LOG_INTERVAL == 0 || processed == counters.total {
        tracing::info!(
            %task_id,
            processed,
            total = counters.total,
            added = counters.added,
            updated = counters.updated,
            failed = counters.failed,
            "Sync progress"
        );
        emit(
            on_progress,
            SyncProgress::UnitsProcessed {
                task_id,
                processed,
                total: counters.total,
                added: counters.added,
                updated: counters.updated,
                failed: counters.failed,
            },
        );
    }
}
