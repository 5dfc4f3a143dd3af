use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::CacheStore;
use crate::error::AppError;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Outcome of a successful window check, surfaced as X-RateLimit-* headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

/// Fixed-window request counter. Uses the shared store when available so
/// limits hold across processes; otherwise falls back to a process-local
/// map, a weaker per-process guarantee.
pub struct RateLimiter {
    store: CacheStore,
    window: Duration,
    memory: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(store: CacheStore, window: Duration) -> Self {
        Self {
            store,
            window,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(
        &self,
        identifier: &str,
        max_requests: u32,
    ) -> Result<RateLimitDecision, AppError> {
        if let Some(count) = self.store.incr(identifier).await {
            return self.check_shared(identifier, max_requests, count).await;
        }
        self.check_local(identifier, max_requests)
    }

    async fn check_shared(
        &self,
        identifier: &str,
        max_requests: u32,
        count: i64,
    ) -> Result<RateLimitDecision, AppError> {
        if count == 1 {
            self.store
                .expire(identifier, self.window.as_secs() as i64)
                .await;
        }

        if count > max_requests as i64 {
            return Err(AppError::TooManyRequests {
                retry_after: self.window.as_secs().max(1),
            });
        }

        Ok(RateLimitDecision {
            limit: max_requests,
            remaining: max_requests.saturating_sub(count as u32),
            reset_at: Utc::now() + chrono::Duration::milliseconds(self.window.as_millis() as i64),
        })
    }

    fn check_local(
        &self,
        identifier: &str,
        max_requests: u32,
    ) -> Result<RateLimitDecision, AppError> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;

        let mut windows = self.memory.lock().unwrap();
        let window = windows
            .entry(identifier.to_string())
            .and_modify(|w| {
                if w.reset_at_ms < now_ms {
                    w.count = 1;
                    w.reset_at_ms = now_ms + window_ms;
                } else {
                    w.count += 1;
                }
            })
            .or_insert(Window {
                count: 1,
                reset_at_ms: now_ms + window_ms,
            });

        if window.count > max_requests {
            let remaining_ms = (window.reset_at_ms - now_ms).max(0) as u64;
            return Err(AppError::TooManyRequests {
                retry_after: remaining_ms.div_ceil(1000).max(1),
            });
        }

        Ok(RateLimitDecision {
            limit: max_requests,
            remaining: max_requests.saturating_sub(window.count),
            reset_at: DateTime::from_timestamp_millis(window.reset_at_ms).unwrap_or_else(Utc::now),
        })
    }

    /// Periodically drop expired fallback windows. Keys are collected first
    /// and removed one at a time so the map is never locked across the
    /// whole sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                limiter.sweep_expired();
            }
        })
    }

    fn sweep_expired(&self) {
        let now_ms = Utc::now().timestamp_millis();
        let expired: Vec<String> = {
            let windows = self.memory.lock().unwrap();
            windows
                .iter()
                .filter(|(_, w)| w.reset_at_ms < now_ms)
                .map(|(k, _)| k.clone())
                .collect()
        };

        for key in expired {
            let mut windows = self.memory.lock().unwrap();
            if windows.get(&key).is_some_and(|w| w.reset_at_ms < now_ms) {
                windows.remove(&key);
            }
        }
    }
}

/// Window identifier: key+tier composite when authenticated, client IP
/// otherwise.
pub fn rate_limit_key(tier_and_key: Option<(&str, &str)>, client_ip: &str) -> String {
    match tier_and_key {
        Some((tier, key)) => format!("ratelimit:{}:{}", tier, key),
        None => format!("ratelimit:ip:{}", client_ip),
    }
}
