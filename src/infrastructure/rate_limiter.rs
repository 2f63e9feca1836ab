//! Fixed-window request pacing.
//!
//! At most `limit` requests are let through per `period`. The window resets
//! once `period` has elapsed since it opened. A caller that finds the window
//! full polls in small fixed increments until it rolls over, so waits are
//! coarse by up to one poll interval.

use crate::infrastructure::clock::Clock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub limit: u32,
    pub period: Duration,
}

impl RateWindow {
    fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.window_start).to_std().unwrap_or(Duration::ZERO)
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        if self.elapsed(now) >= self.period {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn remaining_wait(&self, now: DateTime<Utc>) -> Duration {
        self.period.saturating_sub(self.elapsed(now))
    }
}

pub struct RateLimiter {
    window: Mutex<RateWindow>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, period: Duration, clock: Arc<dyn Clock>) -> Self {
        let window = RateWindow {
            count: 0,
            window_start: clock.now(),
            limit: limit.max(1),
            period,
        };
        Self {
            window: Mutex::new(window),
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        if !poll_interval.is_zero() {
            self.poll_interval = poll_interval;
        }
        self
    }

    /// Waits until the current window has a free slot, then takes it.
    ///
    /// The window lock is held for the whole wait, so concurrent callers queue
    /// behind each other instead of racing on the counter.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;
        let mut now = self.clock.now();
        window.roll_over(now);

        while window.count >= window.limit {
            let wait = window.remaining_wait(now);
            info!(
                wait_secs = wait.as_secs_f64(),
                limit = window.limit,
                "rate limit reached, waiting"
            );
            self.clock.sleep(self.poll_interval.min(wait)).await;
            now = self.clock.now();
            window.roll_over(now);
        }

        window.count += 1;
    }

    pub async fn remaining(&self) -> u32 {
        let mut window = self.window.lock().await;
        window.roll_over(self.clock.now());
        window.limit.saturating_sub(window.count)
    }

    pub async fn snapshot(&self) -> RateWindow {
        self.window.lock().await.clone()
    }
}
