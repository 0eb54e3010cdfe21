//! In-memory task registry and its serial background consumer.
//!
//! ```ignore
//! let registry = TaskRegistry::builder()
//!     .fetcher(Arc::new(client))
//!     .store(Arc::new(DbStore::new(db)))
//!     .build()?;
//!
//! let id = registry.create(SyncKind::Incremental)?;
//! let done = registry.wait_for_terminal(id, Duration::from_millis(500)).await;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::engine::SyncEngine;
use super::error::SyncError;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::task::{SyncTask, TaskSnapshot};
use super::types::{SyncKind, SyncOptions, SyncStatus, TaskId};
use crate::platform::EntityFetcher;
use crate::repository::EntityStore;

/// Lock-guarded map of every task a registry has created.
///
/// Shared between the registry handle and the engine; all task mutation goes
/// through [`TaskTable::with`].
#[derive(Default)]
pub(crate) struct TaskTable {
    tasks: Mutex<HashMap<TaskId, SyncTask>>,
}

impl TaskTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, SyncTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, task: SyncTask) {
        self.lock().insert(task.id(), task);
    }

    /// Run `f` on the task under the lock.
    pub(crate) fn with<R>(&self, id: TaskId, f: impl FnOnce(&mut SyncTask) -> R) -> Option<R> {
        self.lock().get_mut(&id).map(f)
    }

    pub(crate) fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.lock().get(&id).map(SyncTask::snapshot)
    }

    pub(crate) fn snapshots(&self) -> Vec<TaskSnapshot> {
        let mut all: Vec<TaskSnapshot> = self.lock().values().map(SyncTask::snapshot).collect();
        all.sort_by_key(|s| (s.started_at.unwrap_or(s.created_at), s.created_at));
        all
    }

    pub(crate) fn has_active(&self, kind: SyncKind) -> bool {
        self.lock()
            .values()
            .any(|t| t.kind() == kind && !t.status().is_terminal())
    }
}

/// Errors returned by [`TaskRegistryBuilder::build`].
#[derive(Debug, Error)]
pub enum RegistryBuildError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },
}

/// Builder for [`TaskRegistry`].
#[derive(Default)]
pub struct TaskRegistryBuilder {
    fetcher: Option<Arc<dyn EntityFetcher>>,
    store: Option<Arc<dyn EntityStore>>,
    options: SyncOptions,
    on_progress: Option<ProgressCallback>,
    shutdown: Option<CancellationToken>,
}

impl TaskRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn EntityFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Stop the background consumer when `token` is cancelled.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the registry and spawn its consumer on the current tokio runtime.
    ///
    /// # Errors
    /// Returns `RegistryBuildError::MissingField` if the fetcher or store is unset.
    pub fn build(self) -> Result<TaskRegistry, RegistryBuildError> {
        let fetcher = self
            .fetcher
            .ok_or(RegistryBuildError::MissingField { field: "fetcher" })?;
        let store = self
            .store
            .ok_or(RegistryBuildError::MissingField { field: "store" })?;

        let tasks = Arc::new(TaskTable::default());
        let on_progress = self.on_progress.map(Arc::new);
        let shutdown = self.shutdown.unwrap_or_default();
        let (queue, rx) = mpsc::unbounded_channel();

        let engine = SyncEngine::new(
            fetcher,
            store,
            self.options,
            Arc::clone(&tasks),
            on_progress.clone(),
        );
        tokio::spawn(consume(engine, rx, shutdown.clone()));

        Ok(TaskRegistry {
            tasks,
            queue,
            on_progress,
            shutdown,
        })
    }
}

async fn consume(
    engine: SyncEngine,
    mut rx: mpsc::UnboundedReceiver<TaskId>,
    shutdown: CancellationToken,
) {
    loop {
        let task_id = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };
        engine.run_task(task_id).await;
    }
    tracing::debug!("Sync task consumer stopped");
}

/// Handle to a set of sync tasks and the consumer that runs them.
///
/// Cloning is cheap; clones share the same tasks and queue. Several
/// independent registries may coexist.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<TaskTable>,
    queue: mpsc::UnboundedSender<TaskId>,
    on_progress: Option<Arc<ProgressCallback>>,
    shutdown: CancellationToken,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::new()
    }

    /// Queue a new task and return its id without waiting for it to start.
    ///
    /// # Errors
    /// Returns `SyncError::QueueClosed` once the consumer has stopped; the
    /// task is then recorded as `Failed`.
    pub fn create(&self, kind: SyncKind) -> Result<TaskId, SyncError> {
        let task = SyncTask::new(Uuid::new_v4(), kind);
        let task_id = task.id();
        self.tasks.insert(task);

        if self.queue.send(task_id).is_err() {
            self.tasks.with(task_id, |t| {
                t.finish(SyncStatus::Failed, Some(SyncError::QueueClosed.to_string()))
            });
            return Err(SyncError::QueueClosed);
        }

        tracing::info!(%task_id, %kind, "Sync task queued");
        emit(
            self.on_progress.as_deref(),
            SyncProgress::TaskQueued { task_id, kind },
        );
        Ok(task_id)
    }

    /// Copy of the task's current state.
    pub fn get(&self, task_id: TaskId) -> Option<TaskSnapshot> {
        self.tasks.snapshot(task_id)
    }

    /// Request cancellation. Returns `false` for unknown or already finished tasks.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        let cancelled = self
            .tasks
            .with(task_id, SyncTask::request_cancel)
            .unwrap_or(false);
        if cancelled {
            tracing::info!(%task_id, "Sync task cancellation requested");
        }
        cancelled
    }

    /// Every task, oldest start first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        self.tasks.snapshots()
    }

    /// Whether a task of `kind` is pending or running.
    pub fn has_active(&self, kind: SyncKind) -> bool {
        self.tasks.has_active(kind)
    }

    /// Poll until the task is terminal. Returns `None` for unknown ids.
    pub async fn wait_for_terminal(
        &self,
        task_id: TaskId,
        poll_interval: Duration,
    ) -> Option<TaskSnapshot> {
        loop {
            let snapshot = self.get(task_id)?;
            if snapshot.is_terminal() {
                return Some(snapshot);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Cancel every unfinished task and stop the consumer.
    ///
    /// Queued tasks that never started are marked `Cancelled` right away.
    pub fn shutdown(&self) {
        let ids: Vec<TaskId> = self
            .list()
            .into_iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.id)
            .collect();
        for id in ids {
            self.tasks.with(id, |t| {
                t.request_cancel();
                if t.status() == SyncStatus::Pending {
                    t.finish(SyncStatus::Cancelled, None);
                }
            });
        }
        self.shutdown.cancel();
    }
}
