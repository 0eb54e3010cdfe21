//! Wall-clock aligned periodic incremental syncs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::TaskRegistry;
use super::types::{DEFAULT_SCHEDULE_INTERVAL_MINUTES, SyncKind, TaskId};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Cadence; ticks land on UTC multiples of this interval.
    pub interval: Duration,
    /// Skip a tick while an incremental task is pending or running.
    pub skip_if_running: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(u64::from(DEFAULT_SCHEDULE_INTERVAL_MINUTES) * 60),
            skip_if_running: true,
        }
    }
}

impl SchedulerOptions {
    pub fn every_minutes(minutes: u32) -> Self {
        Self {
            interval: Duration::from_secs(u64::from(minutes.max(1)) * 60),
            ..Self::default()
        }
    }
}

/// First instant strictly after `now` that is a whole multiple of `interval`
/// since the Unix epoch. An hourly interval fires at the top of every hour.
pub fn next_tick_after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = i64::try_from(interval.as_secs().max(1)).unwrap_or(i64::MAX);
    let next = (now.timestamp().div_euclid(step) + 1).saturating_mul(step);
    DateTime::from_timestamp(next, 0).unwrap_or(now)
}

/// Creates an incremental task on every tick.
pub struct Scheduler {
    registry: TaskRegistry,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(registry: TaskRegistry, options: SchedulerOptions) -> Self {
        Self { registry, options }
    }

    /// Fire once. Returns the created task, or `None` when skipped.
    pub fn tick(&self) -> Option<TaskId> {
        if self.options.skip_if_running && self.registry.has_active(SyncKind::Incremental) {
            tracing::info!("Incremental sync still active, skipping scheduled run");
            return None;
        }
        match self.registry.create(SyncKind::Incremental) {
            Ok(task_id) => {
                tracing::info!(%task_id, "Scheduled incremental sync queued");
                Some(task_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to queue scheduled sync");
                None
            }
        }
    }

    /// Tick on the aligned cadence until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.options.interval, "Scheduler started");
        loop {
            let now = Utc::now();
            let next = next_tick_after(now, self.options.interval);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, "Waiting for next scheduled run");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    self.tick();
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::platform::{
        CustomerDetail, EntityFetcher, EntityId, EntityRecord, FetchError, GroupDetail, Owner,
    };
    use crate::repository::{self, EntityStore, UpsertOutcome};

    /// Owner listing blocks until the test ends, keeping tasks running.
    struct StalledFetcher;

    #[async_trait]
    impl EntityFetcher for StalledFetcher {
        async fn list_owners(&self) -> crate::platform::Result<Vec<Owner>> {
            std::future::pending().await
        }

        async fn list_entity_ids_for_owner(
            &self,
            _owner: &Owner,
        ) -> crate::platform::Result<Vec<EntityId>> {
            Ok(Vec::new())
        }

        async fn fetch_customer_detail(
            &self,
            id: &EntityId,
        ) -> crate::platform::Result<CustomerDetail> {
            Err(FetchError::not_found(id.clone()))
        }

        async fn list_group_ids(&self) -> crate::platform::Result<Vec<EntityId>> {
            Ok(Vec::new())
        }

        async fn fetch_group_detail(&self, id: &EntityId) -> crate::platform::Result<GroupDetail> {
            Err(FetchError::not_found(id.clone()))
        }
    }

    struct EmptyStore;

    #[async_trait]
    impl EntityStore for EmptyStore {
        async fn exists(&self, _id: &EntityId) -> repository::Result<bool> {
            Ok(false)
        }

        async fn known_ids(&self) -> repository::Result<HashSet<EntityId>> {
            Ok(HashSet::new())
        }

        async fn upsert(&self, _record: &EntityRecord) -> repository::Result<UpsertOutcome> {
            Ok(UpsertOutcome::Inserted)
        }

        async fn stale_ids(&self, _threshold: DateTime<Utc>) -> repository::Result<HashSet<EntityId>> {
            Ok(HashSet::new())
        }

        async fn last_sync_time(&self) -> repository::Result<Option<DateTime<Utc>>> {
            Ok(None)
        }

        async fn set_last_sync_time(&self, _at: DateTime<Utc>) -> repository::Result<()> {
            Ok(())
        }
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::builder()
            .fetcher(Arc::new(StalledFetcher))
            .store(Arc::new(EmptyStore))
            .build()
            .expect("registry builds")
    }

    #[test]
    fn next_tick_aligns_to_the_hour() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 17, 42).unwrap();
        let next = next_tick_after(now, Duration::from_secs(3600));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn next_tick_on_boundary_moves_forward() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        let next = next_tick_after(now, Duration::from_secs(3600));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn next_tick_with_quarter_hour_interval() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 17, 42).unwrap();
        let next = next_tick_after(now, Duration::from_secs(15 * 60));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn every_minutes_clamps_zero() {
        assert_eq!(SchedulerOptions::every_minutes(0).interval, Duration::from_secs(60));
        assert!(SchedulerOptions::default().skip_if_running);
        assert_eq!(SchedulerOptions::default().interval, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn tick_skips_while_incremental_is_active() {
        let scheduler = Scheduler::new(registry(), SchedulerOptions::default());
        assert!(scheduler.tick().is_some());
        assert!(scheduler.tick().is_none());
    }

    #[tokio::test]
    async fn tick_without_skip_always_creates() {
        let scheduler = Scheduler::new(
            registry(),
            SchedulerOptions {
                skip_if_running: false,
                ..SchedulerOptions::default()
            },
        );
        let first = scheduler.tick().expect("queued");
        let second = scheduler.tick().expect("queued");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = Scheduler::new(registry(), SchedulerOptions::default()).spawn(shutdown.clone());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler stops")
            .expect("scheduler task did not panic");
    }
}
