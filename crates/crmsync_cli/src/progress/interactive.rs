use std::sync::Mutex;
use std::time::Duration;

use crmsync::sync::{SyncProgress, SyncStatus, TaskSnapshot};
use indicatif::{ProgressBar, ProgressStyle};

/// Single task bar: a spinner while enumerating, a bar once the total is known.
pub(crate) struct InteractiveReporter {
    bar: ProgressBar,
    /// Set once `WorkListReady` arrived.
    total: Mutex<Option<usize>>,
}

impl InteractiveReporter {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(Self::spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            total: Mutex::new(None),
        }
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::TaskQueued { kind, .. } => {
                self.bar.set_prefix(format!("{kind:12}"));
                self.bar.set_message("Queued");
            }
            SyncProgress::TaskStarted { .. } => {
                self.bar.set_message("Listing owners...");
            }
            SyncProgress::EnumeratedOwners { owners, .. } => {
                self.bar
                    .set_message(format!("Listing customers of {owners} owners..."));
            }
            SyncProgress::WorkListReady { total, skipped, .. } => {
                *self.total.lock().unwrap_or_else(|e| e.into_inner()) = Some(total);
                self.bar.set_length(total as u64);
                self.bar.set_style(Self::bar_style());
                if skipped > 0 {
                    self.bar.set_message(format!("{skipped} up to date"));
                } else {
                    self.bar.set_message("");
                }
            }
            SyncProgress::UnitsProcessed { processed, .. } => {
                self.bar.set_position(processed as u64);
            }
            SyncProgress::UnitFailed {
                entity_id, error, ..
            } => {
                self.bar.println(format!("  ✗ {entity_id}: {error}"));
            }
            SyncProgress::RateLimitBackoff {
                retry_after_ms,
                attempt,
                ..
            } => {
                self.bar.set_message(format!(
                    "Rate limited, retry #{attempt} in {retry_after_ms}ms"
                ));
            }
            _ => {}
        }
    }

    pub(crate) fn update(&self, snapshot: &TaskSnapshot) {
        let known = self.total.lock().unwrap_or_else(|e| e.into_inner()).is_some();
        if known {
            self.bar.set_position(snapshot.processed_count as u64);
            if snapshot.failed_count > 0 {
                self.bar
                    .set_message(format!("{} failed", snapshot.failed_count));
            }
        }
    }

    pub(crate) fn finish(&self, snapshot: &TaskSnapshot) {
        let msg = match snapshot.status {
            SyncStatus::Completed => format!(
                "✓ {} added, {} updated, {} failed",
                snapshot.added_count, snapshot.updated_count, snapshot.failed_count
            ),
            SyncStatus::Cancelled => "Cancelled".to_string(),
            SyncStatus::Failed => format!(
                "✗ {}",
                snapshot.error_message.as_deref().unwrap_or("failed")
            ),
            SyncStatus::Pending | SyncStatus::Running => String::new(),
        };
        self.bar.set_position(snapshot.processed_count as u64);
        self.bar.finish_with_message(msg);
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
