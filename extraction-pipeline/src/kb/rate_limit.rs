use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

/// Spaces requests evenly so the per-minute budget is never exceeded: a
/// limiter built for N requests/minute enforces a 60/N second gap.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            min_interval: Duration::from_secs_f64(60.0 / f64::from(requests)),
            last_request: Mutex::new(None),
        }
    }

    /// Waits until the next request slot opens, then claims it.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_enforces_minimum_gap() {
        let limiter = RateLimiter::per_minute(60); // one per second

        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // Two gaps of one second each, virtually elapsed under paused time.
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::per_minute(50);

        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(10));
    }
}
