//! Bounded retry for transient store failures.
//!
//! SQLite reports lock contention as BUSY/LOCKED; those are worth another attempt after a
//! short exponential backoff. Everything else fails immediately.

use super::error::StorageError;
use crate::config::StoreRetrySettings;
use crate::server::metrics;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Cap for exponential growth.
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &StoreRetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let backoff =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry_count as i32);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    pub fn should_retry(&self, error: &StorageError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Runs `op` until it succeeds, fails permanently, or retries are exhausted.
    pub async fn run<T, F>(&self, operation: &'static str, mut op: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Result<T, StorageError>,
    {
        let mut retry_count = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, retry_count) => {
                    let backoff = self.backoff(retry_count);
                    warn!(
                        "Store operation {} failed ({}), retry {} in {:?}",
                        operation,
                        err,
                        retry_count + 1,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    retry_count += 1;
                }
                Err(err) => {
                    metrics::record_store_error(operation);
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&StoreRetrySettings::default())
    }
}
