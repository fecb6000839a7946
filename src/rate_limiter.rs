use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct Limits {
    pub requests_per_min: u64,
    /// Requests allowed back to back before the rate applies
    pub burst: u64,
}

/// Token bucket spacing out requests to the listing site.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: f64,
    refill_per_sec: f64,
    // current tokens and the time of the last refill
    bucket: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let capacity = limits.burst.max(1) as f64;
        Self {
            inner: Arc::new(Inner {
                capacity,
                refill_per_sec: limits.requests_per_min.max(1) as f64 / 60.0,
                bucket: Mutex::new((capacity, Instant::now())),
            }),
        }
    }

    /// Waits until one request may be made.
    pub async fn acquire(&self) {
        loop {
            let mut guard = self.inner.bucket.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *tokens = (*tokens + elapsed * self.inner.refill_per_sec).min(self.inner.capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            }
            let wait = (1.0 - *tokens) / self.inner.refill_per_sec;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.001))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_immediate() {
        let limiter = RateLimiter::new(Limits {
            requests_per_min: 1,
            burst: 3,
        });
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn requests_beyond_the_burst_wait_for_a_refill() {
        // 1200/min is one token every 50ms
        let limiter = RateLimiter::new(Limits {
            requests_per_min: 1200,
            burst: 1,
        });
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
