//! Token-bucket rate limiter for `ask` (spec §4.6: 10 requests/60s per
//! client). Grounded in the source's in-memory `RateLimiter`
//! (`routes/ask.py`): a map of deque of request timestamps, evicted lazily
//! on every admission check rather than by a background sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const LIMIT: usize = 10;

pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Evicts timestamps older than the window, then admits the request if
    /// fewer than `LIMIT` remain; returns `true` when admitted.
    pub fn check(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let entry = windows.entry(client_id.to_string()).or_default();

        while let Some(front) = entry.front() {
            if now.duration_since(*front) > WINDOW {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() >= LIMIT {
            return false;
        }
        entry.push_back(now);
        true
    }
}
