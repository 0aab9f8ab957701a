//! Sliding-window rate limiter for the IOL API

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Allows at most `max_calls` within any `window`
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn prune(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = calls.front() {
            if now.duration_since(*front) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take a slot if one is free right now. Returns the wait time otherwise.
    fn try_take(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut calls = self.lock();
        Self::prune(&mut calls, now, self.window);
        if calls.len() < self.max_calls {
            calls.push_back(now);
            return Ok(());
        }
        let oldest = calls.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Non-blocking acquire
    pub fn try_acquire(&self) -> bool {
        self.try_take().is_ok()
    }

    /// Wait until a slot is free
    pub async fn acquire(&self) {
        loop {
            match self.try_take() {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "⏳ [IOL] Rate limit reached, waiting");
                    tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
                }
            }
        }
    }

    /// Slots left in the current window
    pub fn remaining(&self) -> usize {
        let now = Instant::now();
        let mut calls = self.lock();
        Self::prune(&mut calls, now, self.window);
        self.max_calls.saturating_sub(calls.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_after_max_calls() {
        let rl = RateLimiter::new(2, Duration::from_secs(60));
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());
        assert_eq!(rl.remaining(), 0);
    }

    #[test]
    fn test_window_expiry_frees_slots() {
        let rl = RateLimiter::new(1, Duration::from_millis(20));
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());
        std::thread::sleep(Duration::from_millis(30));
        assert!(rl.try_acquire());
    }

    #[test]
    fn test_async_acquire_under_capacity_returns_immediately() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        tokio_test::block_on(async {
            rl.acquire().await;
            rl.acquire().await;
        });
        assert_eq!(rl.remaining(), 1);
    }
}
