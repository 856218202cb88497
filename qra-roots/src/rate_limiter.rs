//! Per-extractor minimum-interval throttle

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Ensures at least `min_interval` between successive calls
///
/// The lock is held across the sleep, so concurrent callers on one
/// extractor are serialized and each observes the spacing.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// A limiter that never sleeps
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `min_interval` has elapsed since the previous call
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;

        if !self.min_interval.is_zero() {
            if let Some(last_time) = *last_call {
                let elapsed = last_time.elapsed();
                if elapsed < self.min_interval {
                    let sleep_duration = self.min_interval - elapsed;
                    debug!(
                        sleep_ms = sleep_duration.as_millis() as u64,
                        "Rate limiting: sleeping before request"
                    );
                    sleep(sleep_duration).await;
                }
            }
        }

        *last_call = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}
