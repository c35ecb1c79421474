//! Exponential backoff for on-demand operations run by the sync actor.

use std::future::Future;
use std::time::Duration;

use crate::config::SchedulerSettings;
use crate::constants::{INITIAL_RETRY_DELAY_MS, MAX_RETRIES, MAX_RETRY_DELAY_SECS};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_secs(MAX_RETRY_DELAY_SECS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }
}

impl From<&SchedulerSettings> for RetryConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self::new(
            settings.max_retries,
            Duration::from_millis(settings.initial_retry_delay_ms),
            Duration::from_secs(settings.max_retry_delay_secs),
        )
    }
}

/// Execute an async operation with exponential backoff retry.
///
/// Returns the first success, or the last error once `config.max_retries`
/// retries are used up.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(config, |_| true, operation).await
}

/// Like [`with_retry`], but errors rejected by `retryable` are returned
/// immediately.
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempts += 1;
                if attempts > config.max_retries || !retryable(&e) {
                    return Err(e);
                }

                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempts,
                    config.max_retries + 1,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;

                // Exponential backoff with cap
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}
