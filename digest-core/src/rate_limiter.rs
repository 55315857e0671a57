use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    #[serde(with = "seconds")]
    pub time_window: Duration,
    pub burst_allowance: u32,
    /// Requests allowed in flight at once.
    pub max_concurrent: u32,
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl RateLimitConfig {
    /// Discourse throttles anonymous clients at roughly one request per second.
    pub fn discourse() -> Self {
        Self {
            max_requests: 60,
            time_window: Duration::from_secs(60),
            burst_allowance: 5,
            max_concurrent: 2,
        }
    }

    /// Resend's default account limit is 2 requests per second.
    pub fn email_provider() -> Self {
        Self {
            max_requests: 2,
            time_window: Duration::from_secs(1),
            burst_allowance: 2,
            max_concurrent: 4,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            max_requests: 1_000_000,
            time_window: Duration::from_secs(1),
            burst_allowance: 1_000,
            max_concurrent: 64,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::discourse()
    }
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_rate).min(capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance.max(1) as f64;
        let window = config.time_window.as_secs_f64().max(f64::EPSILON);
        let refill_rate = config.max_requests.max(1) as f64 / window;

        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// Takes tokens, or reports how long until enough have refilled.
    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    /// Empties the bucket so the next caller waits a full refill interval.
    pub async fn drain(&self) {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);
        state.tokens = 0.0;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
    semaphore: Arc<Semaphore>,
    rate_limited: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1) as usize));
        let token_bucket = TokenBucket::new(&config);

        Self {
            token_bucket,
            semaphore,
            rate_limited: AtomicU64::new(0),
        }
    }

    /// Waits for a concurrency slot and a token. The slot is released when
    /// the permit is dropped.
    pub async fn acquire_permit(&self) -> Result<RateLimitPermit, CoreError> {
        let start_time = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::Internal {
                message: "rate limiter semaphore closed".to_string(),
            })?;

        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }

        Ok(RateLimitPermit {
            _permit: permit,
            queue_wait_time: start_time.elapsed(),
        })
    }

    /// Remote side answered 429: stop handing out burst tokens until the
    /// bucket refills.
    pub async fn record_rate_limited(&self) {
        let total = self.rate_limited.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(total, "Remote rate limit hit; draining token bucket");
        self.token_bucket.drain().await;
    }

    /// 429 responses seen since this limiter was created.
    pub fn rate_limited_count(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
    pub queue_wait_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_bucket_basic() {
        let config = RateLimitConfig {
            max_requests: 10,
            time_window: Duration::from_secs(10),
            burst_allowance: 5,
            max_concurrent: 5,
        };

        let bucket = TokenBucket::new(&config);

        for _ in 0..5 {
            assert!(bucket.acquire(1.0).await.is_ok());
        }
        assert!(bucket.acquire(1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_token_bucket_refill() {
        let config = RateLimitConfig {
            max_requests: 20,
            time_window: Duration::from_secs(1),
            burst_allowance: 2,
            max_concurrent: 1,
        };

        let bucket = TokenBucket::new(&config);

        assert!(bucket.acquire(2.0).await.is_ok());
        let wait = bucket.acquire(1.0).await.unwrap_err();
        assert!(wait <= Duration::from_millis(60));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(bucket.acquire(1.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_permits_bound_concurrency() {
        let config = RateLimitConfig {
            max_concurrent: 2,
            ..RateLimitConfig::unlimited()
        };
        let limiter = RateLimiter::new(config);

        let first = limiter.acquire_permit().await.unwrap();
        let _second = limiter.acquire_permit().await.unwrap();
        assert_eq!(limiter.available_permits(), 0);

        drop(first);
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_response_drains_burst() {
        let config = RateLimitConfig {
            max_requests: 1,
            time_window: Duration::from_secs(60),
            burst_allowance: 5,
            max_concurrent: 1,
        };
        let limiter = RateLimiter::new(config);
        let _permit = limiter.acquire_permit().await.unwrap();

        limiter.record_rate_limited().await;
        assert_eq!(limiter.rate_limited_count(), 1);
        assert!(limiter.token_bucket.acquire(1.0).await.is_err());
    }

    #[test]
    fn test_config_reads_window_in_seconds() {
        let config: RateLimitConfig = toml::from_str(
            "max_requests = 10\ntime_window = 5\nburst_allowance = 3\nmax_concurrent = 2",
        )
        .unwrap();
        assert_eq!(config.time_window, Duration::from_secs(5));
    }
}
