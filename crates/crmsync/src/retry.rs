//! Bounded retry for rate-limited platform calls.
//!
//! Only [`FetchError::RateLimited`] is retried. Every other error surfaces
//! immediately and fails the unit.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::platform::{FetchError, short_error_message};
use crate::sync::{
    DEFAULT_RATE_LIMIT_RETRIES, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, ProgressCallback,
    SyncProgress,
};

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: DEFAULT_RATE_LIMIT_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default delays with a custom retry budget.
    #[must_use]
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn to_backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Run `operation`, retrying with backoff while it fails with a rate-limit error.
///
/// `entity_id` is only used for logs and [`SyncProgress::RateLimitBackoff`].
///
/// ```ignore
/// let detail = with_retry(
///     || fetcher.fetch_customer_detail(&id),
///     &RetryConfig::default(),
///     &id,
///     None,
/// ).await?;
/// ```
pub async fn with_retry<T, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    entity_id: &str,
    on_progress: Option<&ProgressCallback>,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.to_backoff())
        .notify(|err: &FetchError, dur: Duration| {
            let current_attempt = attempt.load(Ordering::SeqCst);
            if let Some(cb) = on_progress {
                cb(SyncProgress::RateLimitBackoff {
                    entity_id: entity_id.to_string(),
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current_attempt,
                });
            }
            tracing::debug!(
                entity_id,
                attempt = current_attempt,
                "Rate limited, retrying in {:?}: {}",
                dur,
                short_error_message(err)
            );
        })
        .when(FetchError::is_rate_limited)
        .await
}
