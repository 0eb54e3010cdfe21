use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use crmsync::sync::{SyncKind, SyncStatus, TaskSnapshot};
use tokio_util::sync::CancellationToken;

use crate::SyncArgs;
use crate::commands::shared::build_registry;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// How often the task snapshot is polled for the progress display.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Failures listed in the summary before truncating.
const MAX_DISPLAYED_FAILURES: usize = 10;

/// Run one sync task to completion.
///
/// Ctrl+C cancels the task; the command still waits for it to settle so the
/// summary reflects what was written. A `Failed` task is returned as an error.
pub(crate) async fn handle_sync(
    kind: SyncKind,
    args: &SyncArgs,
    config: &Config,
    database_url: &str,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let reporter = Arc::new(ProgressReporter::new());
    let registry = build_registry(config, database_url, args, Some(reporter.as_callback())).await?;

    let task_id = registry.create(kind)?;
    let mut cancel_sent = false;

    let snapshot = loop {
        tokio::select! {
            _ = shutdown.cancelled(), if !cancel_sent => {
                cancel_sent = true;
                registry.cancel(task_id);
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let Some(snapshot) = registry.get(task_id) else {
            return Err(format!("Sync task {task_id} disappeared from the registry").into());
        };
        reporter.update(&snapshot);
        if snapshot.is_terminal() {
            break snapshot;
        }
    };

    reporter.finish(&snapshot);
    registry.shutdown();
    display_summary(&snapshot, reporter.is_interactive());

    match snapshot.status {
        SyncStatus::Failed => Err(format!(
            "{} sync failed: {}",
            snapshot.kind,
            snapshot.error_message.as_deref().unwrap_or("unknown error")
        )
        .into()),
        _ => Ok(()),
    }
}

fn display_summary(snapshot: &TaskSnapshot, is_tty: bool) {
    if !is_tty {
        tracing::info!(
            task_id = %snapshot.id,
            kind = %snapshot.kind,
            status = %snapshot.status,
            total = snapshot.total_count,
            processed = snapshot.processed_count,
            added = snapshot.added_count,
            updated = snapshot.updated_count,
            failed = snapshot.failed_count,
            "Sync finished"
        );
        for failure in &snapshot.recent_failures {
            tracing::warn!(entity = %failure.entity_id, error = %failure.error, "Unit failed");
        }
        return;
    }

    let marker = match snapshot.status {
        SyncStatus::Completed if snapshot.failed_count == 0 => style("✓").green().bold(),
        SyncStatus::Completed | SyncStatus::Cancelled => style("⚠").yellow().bold(),
        _ => style("✗").red().bold(),
    };
    println!(
        "\n{} {} sync {}",
        marker,
        style(snapshot.kind).cyan(),
        snapshot.status
    );
    println!(
        "  {} of {} processed: {} added, {} updated, {} failed",
        snapshot.processed_count,
        snapshot.total_count,
        style(snapshot.added_count).green(),
        style(snapshot.updated_count).cyan(),
        style(snapshot.failed_count).red(),
    );
    if let Some(error) = &snapshot.error_message {
        eprintln!("  {} {}", style("Error:").red().bold(), error);
    }

    if !snapshot.recent_failures.is_empty() {
        eprintln!(
            "\n{}",
            style(format!("Recent failures ({} total):", snapshot.failed_count))
                .yellow()
                .bold()
        );
        for failure in snapshot.recent_failures.iter().take(MAX_DISPLAYED_FAILURES) {
            eprintln!("  - {}: {}", failure.entity_id, failure.error);
        }
    }
}
