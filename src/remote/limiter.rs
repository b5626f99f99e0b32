use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::GatewayError;

/// Token bucket limiting calls through one pool handle. Capacity equals the
/// per-second rate, so a full bucket admits at most one second of burst.
/// Waiters block up to the caller's deadline, then fail with
/// `RateLimitExceeded` instead of queueing unboundedly.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// `rate` <= 0 disables limiting.
    pub fn new(rate: f64) -> Self {
        let capacity = rate.max(1.0);
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self, deadline: Duration) -> Result<(), GatewayError> {
        if self.rate <= 0.0 {
            return Ok(());
        }
        let start = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };
            if start.elapsed() + wait > deadline {
                return Err(GatewayError::RateLimitExceeded);
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_up_to_capacity_then_paced() {
        let bucket = TokenBucket::new(5.0);
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire(Duration::from_secs(1)).await.unwrap();
        }
        // Burst drains instantly.
        assert!(start.elapsed() < Duration::from_millis(100));

        // The sixth call has to wait for a refill.
        let before = Instant::now();
        bucket.acquire(Duration::from_secs(1)).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn deadline_exceeded_fails_fast() {
        let bucket = TokenBucket::new(1.0);
        bucket.acquire(Duration::from_secs(1)).await.unwrap();
        let err = bucket.acquire(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn zero_rate_disables_limiting() {
        let bucket = TokenBucket::new(0.0);
        for _ in 0..100 {
            bucket.acquire(Duration::from_millis(1)).await.unwrap();
        }
    }
}
