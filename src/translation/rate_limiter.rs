/*!
 * Token bucket limiting upstream requests per second.
 *
 * One limiter is shared by every caller of a run. The bucket holds at most
 * `max(qps, 1)` tokens and starts full; waiting happens outside the lock.
 */

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared QPS limiter
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens added per second
    rate: f64,
    /// Bucket size
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter allowing `qps` requests per second
    pub fn new(qps: f64) -> Self {
        let rate = if qps > 0.0 { qps } else { 1.0 };
        let capacity = rate.max(1.0);
        Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Configured requests per second
    pub fn qps(&self) -> f64 {
        self.rate
    }

    /// Take one token, or return how long to wait for the next one
    fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate))
        }
    }

    /// Wait until a request may be sent
    pub async fn acquire(&self) {
        loop {
            match self.try_take() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}
