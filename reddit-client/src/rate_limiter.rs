use redlake_core::RateLimitSettings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl RateLimitConfig {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            requests_per_minute: settings.requests_per_minute,
            burst: settings.burst,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Conservative share of Reddit's OAuth allowance.
        Self {
            requests_per_minute: 60,
            burst: 10,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket gating outbound requests. Capacity is the burst
/// allowance; tokens refill continuously at the configured rate.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
    waits: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.burst.max(1) as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate: config.requests_per_minute.max(1) as f64 / 60.0,
            waits: AtomicU64::new(0),
        }
    }

    /// Takes one token, or reports how long until one is available.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_rate))
        }
    }

    /// Takes one token, sleeping until the bucket refills when empty.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Ok(()) => return,
                Err(wait) => {
                    self.waits.fetch_add(1, Ordering::Relaxed);
                    debug!("rate limit reached, pausing for {:?}", wait);
                    sleep(wait).await;
                }
            }
        }
    }

    /// How many times `acquire` had to pause so far.
    pub fn total_waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bucket_allows_burst_then_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst: 5,
        });

        for _ in 0..5 {
            assert!(limiter.try_acquire().await.is_ok());
        }
        assert!(limiter.try_acquire().await.is_err());
    }

    #[tokio::test]
    async fn bucket_refills_over_time() {
        // 600 per minute = 10 tokens per second.
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 600,
            burst: 2,
        });

        assert!(limiter.try_acquire().await.is_ok());
        assert!(limiter.try_acquire().await.is_ok());
        assert!(limiter.try_acquire().await.is_err());

        sleep(Duration::from_millis(250)).await;
        assert!(limiter.try_acquire().await.is_ok());
    }

    #[tokio::test]
    async fn acquire_waits_and_counts() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 6000,
            burst: 1,
        });

        limiter.acquire().await;
        assert_eq!(limiter.total_waits(), 0);

        // Bucket is empty now; the second acquire has to pause at least once.
        limiter.acquire().await;
        assert!(limiter.total_waits() >= 1);
    }

    #[tokio::test]
    async fn reported_wait_is_bounded_by_refill_rate() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst: 1,
        });

        limiter.try_acquire().await.unwrap();
        let wait = limiter.try_acquire().await.unwrap_err();
        // One token per second: the deficit can never take longer than that.
        assert!(wait <= Duration::from_secs(1));
    }
}
