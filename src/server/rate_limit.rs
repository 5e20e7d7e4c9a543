//! Per-client sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct RateLimiter {
    // client key -> timestamps of accepted requests inside the window
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// 是否允許這次請求；允許時記錄時間戳
    pub fn allow(&self, client_key: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // 順便清掉整個視窗都沒有請求的客戶端
        hits.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
        });

        let stamps = hits.entry(client_key.to_string()).or_default();
        while stamps
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            stamps.pop_front();
        }

        if stamps.len() >= self.max_requests {
            warn!("🚦 Rate limit exceeded for {}", client_key);
            return false;
        }

        stamps.push_back(now);
        debug!(
            "Rate limit OK for {} ({}/{})",
            client_key,
            stamps.len(),
            self.max_requests
        );
        true
    }

    pub fn retry_after_seconds(&self) -> u64 {
        self.window.as_secs()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, 60)
    }
}
