use crate::error::{CoreError, DatabaseError, DeliveryError, ProviderError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Data providers are slow to recover; back off harder.
    pub fn provider() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }

    /// Per-recipient sends.
    pub fn delivery() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 15000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the remote side asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

impl RetryStrategy {
    pub fn allows_retry(&self) -> bool {
        !matches!(self, RetryStrategy::NoRetry)
    }
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::Provider(e) => provider_retry_strategy(e),
        CoreError::Delivery(e) => delivery_retry_strategy(e),
        CoreError::Database(e) => database_retry_strategy(e),
        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() {
                RetryStrategy::Retry
            } else {
                RetryStrategy::NoRetry
            }
        }
        _ => RetryStrategy::NoRetry,
    }
}

pub fn provider_retry_strategy(error: &ProviderError) -> RetryStrategy {
    match error {
        ProviderError::RateLimitExceeded { retry_after, .. } => {
            RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
        }
        ProviderError::ServerError { status_code, .. } if *status_code >= 500 => {
            RetryStrategy::Retry
        }
        ProviderError::Unavailable { .. } | ProviderError::RequestTimeout { .. } => {
            RetryStrategy::Retry
        }
        // The provider answered and said no; asking again will not change that.
        ProviderError::Reported { .. }
        | ProviderError::ServerError { .. }
        | ProviderError::Forbidden { .. }
        | ProviderError::NotFound { .. }
        | ProviderError::InvalidPayload { .. } => RetryStrategy::NoRetry,
    }
}

pub fn delivery_retry_strategy(error: &DeliveryError) -> RetryStrategy {
    match error {
        DeliveryError::RateLimited { retry_after } => {
            RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
        }
        DeliveryError::Transient { .. } => RetryStrategy::Retry,
        _ => RetryStrategy::NoRetry,
    }
}

pub fn database_retry_strategy(error: &DatabaseError) -> RetryStrategy {
    match error {
        DatabaseError::DatabaseLocked => RetryStrategy::RetryWithDelay(Duration::from_millis(100)),
        DatabaseError::ConnectionFailed { .. } => {
            RetryStrategy::RetryWithDelay(Duration::from_secs(1))
        }
        _ => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
}

/// Result of a retried operation together with how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, CoreError>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    pub fn into_result(self) -> Result<T, CoreError> {
        self.result
    }
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Same backoff and shared metrics, with a different attempt ceiling.
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        let mut limited = self.clone();
        limited.config.max_attempts = max_attempts;
        limited
    }

    /// Execute an operation with retry logic. The last error is returned
    /// unchanged so callers can still classify it.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let max_delay = Duration::from_millis(self.config.max_delay_ms);
        let mut total_delay_ms = 0u64;
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let start_time = Instant::now();
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        let mut metrics = self.metrics();
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {}ms)",
                            operation_name, attempt, total_delay_ms
                        );
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                    };
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {} failed for {} after {:?}: {}",
                attempt + 1,
                operation_name,
                start_time.elapsed(),
                error
            );

            let has_budget = attempt + 1 < max_attempts;
            let delay = match get_retry_strategy(&error) {
                RetryStrategy::Retry if has_budget => Some(calculate_delay(attempt, &self.config)),
                RetryStrategy::RetryWithDelay(requested) if has_budget => {
                    Some(requested.min(max_delay))
                }
                _ => None,
            };

            match delay {
                Some(delay) => {
                    total_delay_ms += delay.as_millis() as u64;
                    info!(
                        "Retrying {} in {:?} due to: {}",
                        operation_name, delay, error
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    {
                        let mut metrics = self.metrics();
                        metrics.total_retries += attempt as u64;
                        metrics.failed_operations += 1;
                    }
                    warn!(
                        "Operation {} gave up after {} attempt(s) with total delay of {}ms: {}",
                        operation_name,
                        attempt + 1,
                        total_delay_ms,
                        error
                    );
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt + 1,
                    };
                }
            }
        }
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        self.metrics().clone()
    }

    fn metrics(&self) -> MutexGuard<'_, RetryMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
