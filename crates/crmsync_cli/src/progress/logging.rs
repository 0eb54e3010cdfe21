use crmsync::sync::SyncProgress;

/// Structured logging for non-TTY output.
///
/// The library already logs task lifecycle and periodic counters at `info`;
/// this adds the events it only logs at `debug`.
pub(crate) struct LoggingReporter;

impl LoggingReporter {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::EnumeratedOwners { task_id, owners } => {
                tracing::info!(%task_id, owners, "Enumerated owners");
            }
            SyncProgress::RateLimitBackoff {
                entity_id,
                retry_after_ms,
                attempt,
            } => {
                tracing::info!(entity_id = %entity_id, retry_after_ms, attempt, "Rate limited, backing off");
            }
            other => {
                tracing::trace!(event = ?other, "Sync progress");
            }
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
