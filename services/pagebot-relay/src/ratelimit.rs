//! Fixed-window per-user rate limiting.
//!
//! Each user gets a counting window of fixed length. Once the window's
//! reset instant passes, the next call replaces the window instead of
//! incrementing it. Bursts straddling a window boundary can reach up to
//! twice the nominal rate; that approximation is accepted behavior, not a
//! bug.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Per-user counting window.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window request limiter keyed by user id.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window` per user.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
        }
    }

    /// Build a limiter from the relay configuration section.
    pub fn from_config(config: &pagebot_common::config::RelayConfig) -> Self {
        Self::new(
            Duration::seconds(config.rate_limit_window_secs as i64),
            config.rate_limit_max,
        )
    }

    /// Record one request for a user and return whether it is allowed.
    ///
    /// The first call in a window (or after the previous window expired)
    /// always passes and starts a fresh count.
    pub fn allow(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let mut entry = self
            .windows
            .entry(user_id.to_string())
            .or_insert(RateWindow {
                count: 0,
                reset_at: now + self.window,
            });

        if now >= entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + self.window;
            return true;
        }

        entry.count += 1;
        entry.count <= self.max_requests
    }

    /// Number of users with a live window (for introspection in tests).
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}
