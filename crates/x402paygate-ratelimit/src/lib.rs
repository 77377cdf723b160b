//! Per-endpoint sliding-window admission control.
//!
//! Each endpoint gets its own window of recent request timestamps. A
//! request is admitted if fewer than `limit` timestamps remain in the
//! trailing `window` once expired entries are dropped. The map is a
//! `DashMap` keyed by endpoint id with a short-held per-key mutex, the same
//! shape this codebase uses for other per-key caches that must not hold a
//! shared lock across an `.await` -- here there's no `.await` in the
//! critical section at all, but the shape still avoids a single process-wide
//! lock across unrelated endpoints.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

const WINDOW: Duration = Duration::from_millis(1000);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const STALE_AFTER: Duration = Duration::from_secs(60);

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the window is expected to have room again.
    pub reset_at: u64,
}

#[derive(Default)]
struct Window {
    arrivals: VecDeque<Instant>,
}

/// A process-wide sliding-window limiter, one window per endpoint.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<Uuid, Arc<Mutex<Window>>>>,
    last_cleanup: Arc<AtomicU64>,
    started_at: Instant,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            last_cleanup: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Checks whether a request to `endpoint_id` is admitted under
    /// `limit_per_sec`. Safe for concurrent callers: two racing checks may
    /// both succeed up to the limit, never past it.
    pub async fn check(&self, endpoint_id: Uuid, limit_per_sec: u32) -> CheckResult {
        self.maybe_cleanup();

        let window = {
            let entry = self
                .windows
                .entry(endpoint_id)
                .or_insert_with(|| Arc::new(Mutex::new(Window::default())));
            Arc::clone(entry.value())
        };

        let mut window = window.lock().await;
        let now = Instant::now();
        while let Some(&front) = window.arrivals.front() {
            if now.duration_since(front) >= WINDOW {
                window.arrivals.pop_front();
            } else {
                break;
            }
        }

        let count = window.arrivals.len() as u32;
        let allowed = count < limit_per_sec;
        if allowed {
            window.arrivals.push_back(now);
        }

        let reset_at = window
            .arrivals
            .front()
            .map(|&oldest| oldest + WINDOW)
            .unwrap_or(now + WINDOW);
        let remaining = limit_per_sec.saturating_sub(window.arrivals.len() as u32);

        CheckResult {
            allowed,
            limit: limit_per_sec,
            remaining,
            reset_at: self.to_unix_seconds(reset_at),
        }
    }

    /// Converts a future `Instant` into a Unix-seconds timestamp by
    /// measuring its offset from now on the monotonic clock and applying
    /// that offset to the wall clock.
    fn to_unix_seconds(&self, instant: Instant) -> u64 {
        let now_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let offset = instant.saturating_duration_since(Instant::now());
        (now_unix + offset).as_secs()
    }

    fn maybe_cleanup(&self) {
        let now_secs = self.started_at.elapsed().as_secs();
        let last = self.last_cleanup.load(Ordering::Relaxed);
        if now_secs.saturating_sub(last) < CLEANUP_INTERVAL.as_secs() {
            return;
        }
        if self
            .last_cleanup
            .compare_exchange(last, now_secs, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let now = Instant::now();
        self.windows.retain(|_, window| {
            match window.try_lock() {
                Ok(guard) => guard
                    .arrivals
                    .back()
                    .map(|&latest| now.duration_since(latest) < STALE_AFTER)
                    .unwrap_or(false),
                // Held by an in-flight request; keep it rather than race the lock.
                Err(_) => true,
            }
        });
        tracing::debug!(remaining = self.windows.len(), "rate limiter cleanup pass");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_limit_then_denies() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        assert!(limiter.check(endpoint, 2).await.allowed);
        assert!(limiter.check(endpoint, 2).await.allowed);
        let third = limiter.check(endpoint, 2).await;
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[tokio::test]
    async fn window_expires_after_1000ms() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        assert!(limiter.check(endpoint, 1).await.allowed);
        assert!(!limiter.check(endpoint, 1).await.allowed);
        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert!(limiter.check(endpoint, 1).await.allowed);
    }

    #[tokio::test]
    async fn endpoints_do_not_share_windows() {
        let limiter = RateLimiter::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(limiter.check(a, 1).await.allowed);
        assert!(!limiter.check(a, 1).await.allowed);
        assert!(limiter.check(b, 1).await.allowed);
    }

    #[tokio::test]
    async fn concurrent_checks_never_exceed_the_limit() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.check(endpoint, 5).await.allowed }));
        }
        let mut allowed_count = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed_count += 1;
            }
        }
        assert!(allowed_count <= 5);
    }
}
