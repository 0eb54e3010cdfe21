use std::error::Error;
use std::time::Duration;

use chrono::Utc;
use crmsync::sync::{Scheduler, SchedulerOptions, next_tick_after};
use tokio_util::sync::CancellationToken;

use crate::SyncArgs;
use crate::commands::shared::build_registry;
use crate::config::Config;

/// How long to wait for an in-flight task to settle after Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_POLL: Duration = Duration::from_millis(250);

/// Queue an incremental sync on every aligned tick until Ctrl+C.
pub(crate) async fn handle_schedule(
    interval_minutes: Option<u32>,
    args: &SyncArgs,
    config: &Config,
    database_url: &str,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let registry = build_registry(config, database_url, args, None).await?;

    let minutes = interval_minutes.unwrap_or(config.sync.schedule_interval_minutes);
    let options = SchedulerOptions {
        skip_if_running: config.sync.skip_if_running,
        ..SchedulerOptions::every_minutes(minutes)
    };
    let next = next_tick_after(Utc::now(), options.interval);
    tracing::info!(
        interval_minutes = minutes.max(1),
        next_run = %next,
        "Scheduling incremental syncs; press Ctrl+C to stop"
    );

    Scheduler::new(registry.clone(), options)
        .run(shutdown)
        .await;

    let active: Vec<_> = registry
        .list()
        .into_iter()
        .filter(|snapshot| !snapshot.is_terminal())
        .map(|snapshot| snapshot.id)
        .collect();
    registry.shutdown();

    for task_id in active {
        match tokio::time::timeout(DRAIN_TIMEOUT, registry.wait_for_terminal(task_id, DRAIN_POLL))
            .await
        {
            Ok(Some(snapshot)) => tracing::info!(
                %task_id,
                status = %snapshot.status,
                processed = snapshot.processed_count,
                "Sync task settled"
            ),
            Ok(None) => {}
            Err(_) => tracing::warn!(%task_id, "Sync task did not settle before exit"),
        }
    }

    Ok(())
}
