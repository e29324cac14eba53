//! Sliding-window rate limiting shared per endpoint class.
//!
//! One limiter instance guards one logical endpoint class (public market
//! data vs private trading). Both acquisition styles share the same
//! window state: `acquire` suspends the task, `acquire_blocking` parks
//! the worker thread. The suspending variant never blocks the scheduler.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Sliding-window parameters for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum calls admitted per window.
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    /// Window duration in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_max_calls() -> u32 {
    5
}

fn default_window_ms() -> u64 {
    1_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_ms: default_window_ms(),
        }
    }
}

/// Upper bound on a single wait slice so a pruned window is re-examined
/// promptly even when the head timestamp is far in the past.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Sliding-window call admission control.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_calls: config.max_calls as usize,
            window: Duration::from_millis(config.window_ms),
            timestamps: Mutex::new(VecDeque::with_capacity(config.max_calls as usize)),
        }
    }

    /// Try to admit a call right now. On refusal, returns how long the
    /// caller should wait before re-checking.
    fn try_admit(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) > self.window)
        {
            timestamps.pop_front();
        }
        if timestamps.len() < self.max_calls {
            timestamps.push_back(now);
            return Ok(());
        }
        let head = *timestamps.front().expect("window is full");
        let elapsed = now.duration_since(head);
        let wait = self.window.saturating_sub(elapsed);
        Err(wait.min(MAX_SLEEP_SLICE))
    }

    /// Suspending acquisition for cooperatively-scheduled callers.
    ///
    /// Yields control back to the scheduler while waiting; never performs
    /// a thread-blocking sleep.
    pub async fn acquire(&self) {
        let mut warned = false;
        loop {
            match self.try_admit() {
                Ok(()) => return,
                Err(wait) => {
                    if !warned {
                        warn!(wait_ms = wait.as_millis() as u64, "rate limit window full");
                        warned = true;
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Thread-blocking acquisition for worker-pool callers.
    pub fn acquire_blocking(&self) {
        loop {
            match self.try_admit() {
                Ok(()) => return,
                Err(wait) => std::thread::sleep(wait),
            }
        }
    }

    /// Number of calls inside the current window.
    pub fn current_count(&self) -> usize {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) > self.window)
        {
            timestamps.pop_front();
        }
        timestamps.len()
    }

    /// Clear the window.
    pub fn reset(&self) {
        self.timestamps.lock().clear();
    }
}
