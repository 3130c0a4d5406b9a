//! Request-per-minute limiting for a single provider

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket holding up to one minute of requests. Shared by every task
/// that calls the same provider; the bucket is only touched under its lock.
#[derive(Debug)]
pub struct RequestRateLimiter {
    requests_per_minute: u32,
    capacity: f64,
    per_second: f64,
    bucket: Mutex<Bucket>,
}

impl RequestRateLimiter {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        let capacity = f64::from(requests_per_minute);
        Self {
            requests_per_minute,
            capacity,
            per_second: capacity / 60.0,
            bucket: Mutex::new(Bucket { tokens: capacity, refilled_at: Instant::now() }),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.per_second).min(self.capacity);
        bucket.refilled_at = now;
    }

    /// Take a token without waiting
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then take it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.per_second)
            };
            surveyor_telemetry::debug!(
                wait_ms = wait.as_millis() as u64,
                "request rate limit reached; waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
