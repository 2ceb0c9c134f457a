use std::time::{Duration, Instant};
use dashmap::DashMap;
use crate::error::{Error, Result};
use crate::types::ids::UserId;

/// Fixed-window cap on money-moving requests per user. Also bounds how
/// fast a PIN can be guessed.
pub struct RateLimiter {
    windows: DashMap<UserId, Window>,
    max_requests: usize,
    window: Duration,
}

struct Window {
    opened_at: Instant,
    used: usize,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        RateLimiter {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// Counts one request against `user_id`, or refuses it.
    pub fn check(&self, user_id: UserId) -> Result<()> {
        let now = Instant::now();
        let mut slot = self.windows.entry(user_id).or_insert_with(|| Window { opened_at: now, used: 0 });

        if now.duration_since(slot.opened_at) > self.window {
            *slot = Window { opened_at: now, used: 0 };
        }
        if slot.used >= self.max_requests {
            tracing::warn!(user_id = %user_id, limit = self.max_requests, "rate limit exceeded");
            return Err(Error::RateLimited);
        }
        slot.used += 1;
        Ok(())
    }

    /// Drops windows that have run out, returning how many went.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| now.duration_since(w.opened_at) <= self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
