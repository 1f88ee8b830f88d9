use redlake_core::{CoreError, ErrorExt, RetrySettings};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, first try included.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds).
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Retry config tuned for the Reddit data API.
    pub fn reddit() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            // 20% jitter to prevent thundering herd
            jitter_factor: 0.2,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: settings.jitter_factor,
        }
    }
}

/// What to do with a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff.
    Retry,
    /// Suspend for a server-specified interval, then retry.
    RetryWithDelay(Duration),
    /// Don't retry (permanent failures).
    NoRetry,
}

/// Classifies an error: throttling signals carry their own delay, other
/// transient failures back off exponentially, the rest fail fast.
pub fn retry_strategy(error: &CoreError) -> RetryStrategy {
    if let Some(delay) = error.retry_after() {
        return RetryStrategy::RetryWithDelay(delay);
    }
    if error.is_retryable() {
        RetryStrategy::Retry
    } else {
        RetryStrategy::NoRetry
    }
}

/// Delay before the given zero-based retry attempt, exponential with
/// jitter, capped at `max_delay_ms`.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let exponential_delay = if attempt == 0 {
        Duration::from_millis(config.base_delay_ms)
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

/// Wraps fallible async operations with bounded suspend-and-retry. A
/// throttled operation waits out the signalled interval instead of
/// failing the run.
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    total_retries: AtomicU64,
    rate_limit_waits: AtomicU64,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_retries: AtomicU64::new(0),
            rate_limit_waits: AtomicU64::new(0),
        }
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            "{} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let attempts_left = attempt + 1 < max_attempts;

                    match retry_strategy(&error) {
                        RetryStrategy::NoRetry => {
                            debug!("not retrying {}: {}", operation_name, error);
                            return Err(error);
                        }
                        _ if !attempts_left => {
                            warn!(
                                "giving up on {} after {} attempts: {}",
                                operation_name, max_attempts, error
                            );
                            return Err(error);
                        }
                        RetryStrategy::RetryWithDelay(delay) => {
                            self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
                            self.total_retries.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                "{} throttled, suspending for {:?}",
                                operation_name, delay
                            );
                            sleep(delay).await;
                        }
                        RetryStrategy::Retry => {
                            let delay = calculate_delay(attempt, &self.config);
                            self.total_retries.fetch_add(1, Ordering::Relaxed);
                            info!(
                                "retrying {} in {:?} after: {}",
                                operation_name, delay, error
                            );
                            sleep(delay).await;
                        }
                    }

                    attempt += 1;
                }
            }
        }
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// How many retries were due to server throttling signals.
    pub fn rate_limit_waits(&self) -> u64 {
        self.rate_limit_waits.load(Ordering::Relaxed)
    }
}
