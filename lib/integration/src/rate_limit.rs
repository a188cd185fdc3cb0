//! Per-user admission control.
//!
//! Fixed windows: each user may send `max_requests` messages per
//! `window_seconds`. Rejected attempts still count against the window.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use palaver_core::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of messages per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECONDS: u32 = 60;

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration in seconds.
    pub window_seconds: u32,
}

impl RateLimitConfig {
    /// Creates a new rate limit configuration.
    #[must_use]
    pub fn new(max_requests: u32, window_seconds: u32) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(i64::from(self.window_seconds))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECONDS)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed.
    Allowed {
        remaining: u32,
        resets_at: DateTime<Utc>,
    },
    /// Rate limit exceeded.
    Exceeded {
        retry_after: Duration,
        resets_at: DateTime<Utc>,
    },
}

impl RateLimitResult {
    /// Returns true if the request is allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Returns the number of remaining requests (0 if exceeded).
    #[must_use]
    pub fn remaining(&self) -> u32 {
        match self {
            Self::Allowed { remaining, .. } => *remaining,
            Self::Exceeded { .. } => 0,
        }
    }

    /// Returns how long until the window resets, if exceeded.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed { .. } => None,
            Self::Exceeded { retry_after, .. } => Some(*retry_after),
        }
    }
}

/// Request count for one user's current window.
#[derive(Debug, Clone)]
struct RateWindow {
    count: u32,
    window_start: DateTime<Utc>,
}

/// A per-user fixed-window rate limiter.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<DashMap<UserId, RateWindow>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(DashMap::new()),
        }
    }

    /// Counts a request from `user` and reports whether it is admitted.
    pub fn is_allowed(&self, user: UserId) -> bool {
        self.check_and_increment(user).is_allowed()
    }

    /// Counts a request from `user` at the current time.
    pub fn check_and_increment(&self, user: UserId) -> RateLimitResult {
        self.check_and_increment_at(user, Utc::now())
    }

    /// Counts a request from `user` at `now`.
    ///
    /// The window restarts once `now` reaches its end. The count is bumped
    /// whether or not the request is admitted.
    pub fn check_and_increment_at(&self, user: UserId, now: DateTime<Utc>) -> RateLimitResult {
        let window = self.config.window();
        let mut entry = self.windows.entry(user).or_insert_with(|| RateWindow {
            count: 0,
            window_start: now,
        });

        if now >= entry.window_start + window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count = entry.count.saturating_add(1);
        let resets_at = entry.window_start + window;

        if entry.count <= self.config.max_requests {
            RateLimitResult::Allowed {
                remaining: self.config.max_requests - entry.count,
                resets_at,
            }
        } else {
            RateLimitResult::Exceeded {
                retry_after: resets_at - now,
                resets_at,
            }
        }
    }

    /// Forgets the window for a user.
    pub fn reset(&self, user: UserId) {
        self.windows.remove(&user);
    }

    /// Returns the number of users with a tracked window.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }

    /// Drops windows that have run out at the current time.
    pub fn purge_stale(&self) -> usize {
        self.purge_stale_at(Utc::now())
    }

    /// Drops windows that have run out at `now`.
    ///
    /// A dropped user starts a fresh window on their next request, exactly
    /// as an expired window would, so admission is unaffected.
    pub fn purge_stale_at(&self, now: DateTime<Utc>) -> usize {
        let window = self.config.window();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.window_start + window > now);
        before.saturating_sub(self.windows.len())
    }
}
