use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::data::RateLimit;
use crate::effects::sleep::sleep_or_cancel;
use crate::error::Result;

// Float refill arithmetic can land a hair under a whole token.
const TOKEN_EPSILON: f64 = 1e-9;
const MIN_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every caller of one engine.
///
/// Starts full. Holds `burst` tokens at most and regains `rate` tokens per
/// second.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let capacity = f64::from(limit.burst);
        Self {
            capacity,
            refill_rate: limit.rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait for a token, or return [`Error::Canceled`](crate::Error::Canceled)
    /// if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let wait = match self.take() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            sleep_or_cancel(wait, cancel).await?;
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.take().is_ok()
    }

    /// Take a token, or report how long until one is due.
    fn take(&self) -> std::result::Result<(), Duration> {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 - TOKEN_EPSILON {
            bucket.tokens = (bucket.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_rate).max(MIN_WAIT))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(rate: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimit { rate, burst })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_available_immediately() {
        let limiter = limiter(1.0, 3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_admissions_stay_under_ceiling() {
        let limiter = Arc::new(limiter(10.0, 10));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                limiter.acquire(&cancel).await.unwrap();
                Instant::now() - start
            }));
        }

        let mut admitted = Vec::new();
        for task in tasks {
            admitted.push(task.await.unwrap());
        }
        admitted.sort();

        for at in &admitted[..10] {
            assert_eq!(*at, Duration::ZERO);
        }
        // The k-th admission past the burst cannot come before k refills.
        let slack = Duration::from_millis(2);
        for (k, at) in admitted[10..].iter().enumerate() {
            let earliest = Duration::from_millis(100 * (k as u64 + 1));
            assert!(*at + slack >= earliest, "admission {k} at {at:?}");
        }
        assert!(admitted[19] <= Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_waiting() {
        let limiter = limiter(0.001, 1);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(err.is_canceled());
    }
}
