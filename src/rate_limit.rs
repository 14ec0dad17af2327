//! Rate Limiting for External Calls
//!
//! Sliding-window quota shared by every caller of one external service.
//! Callers over quota are suspended until the oldest call in the window
//! ages out; they are never rejected.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum calls per window
    pub max_requests: u32,
    /// Rolling window length
    pub window: Duration,
}

impl RateLimitConfig {
    /// 40 completion calls per minute
    pub fn completion() -> Self {
        Self {
            max_requests: 40,
            window: Duration::from_secs(60),
        }
    }

    /// 20 search calls per minute
    pub fn search() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window limiter
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    /// Dispatch timestamps inside the current window, oldest first
    requests: Mutex<VecDeque<Instant>>,
    /// Service name for logging
    name: String,
}

impl SlidingWindowLimiter {
    pub fn new(name: &str, config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: Mutex::new(VecDeque::new()),
            name: name.to_string(),
        }
    }

    /// Wait for a free slot and claim it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut requests = self.requests.lock().await;
                let now = Instant::now();
                Self::evict(&mut requests, now, self.config.window);

                if requests.len() < self.config.max_requests as usize {
                    requests.push_back(now);
                    return;
                }

                // Full: sleep until the oldest entry leaves the window
                match requests.front() {
                    Some(&oldest) => self.config.window.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!(
                "{} quota exhausted ({} per {:?}), waiting {:?}",
                self.name, self.config.max_requests, self.config.window, wait
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Claim a slot only if one is free right now
    pub async fn try_acquire(&self) -> bool {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        Self::evict(&mut requests, now, self.config.window);

        if requests.len() < self.config.max_requests as usize {
            requests.push_back(now);
            true
        } else {
            false
        }
    }

    /// Calls dispatched within the current window
    pub async fn in_window(&self) -> usize {
        let mut requests = self.requests.lock().await;
        Self::evict(&mut requests, Instant::now(), self.config.window);
        requests.len()
    }

    fn evict(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = requests.front() {
            if now.duration_since(front) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }
}
