//! Rate Limiting Infrastructure
//!
//! Fixed-window attempt counters keyed by caller composite
//! (e.g. `login:<ip>:<email>`).
//!
//! ## Limitations
//! [`InMemoryRateLimitStore`] keeps its counters in process memory. They are
//! lost on restart and are not shared between instances. This is acceptable
//! for a rate limit, which throttles, and is not relied on as a security
//! boundary.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
    /// Whole seconds until the window resets (rounded up, at least 1 when rejected)
    pub retry_after_secs: u64,
}

/// Counter state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub reset_at_ms: i64,
}

impl WindowState {
    /// Apply one hit to an optional prior window
    ///
    /// - no window, or window elapsed: restart at count 1
    /// - within window and under the ceiling: increment
    /// - within window and at the ceiling: reject without incrementing
    pub fn hit(
        prior: Option<Self>,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> (Self, RateLimitResult) {
        let state = match prior {
            Some(w) if now_ms < w.reset_at_ms => {
                if w.count >= config.max_requests {
                    let result = RateLimitResult {
                        allowed: false,
                        remaining: 0,
                        reset_at_ms: w.reset_at_ms,
                        retry_after_secs: ceil_secs(w.reset_at_ms - now_ms).max(1),
                    };
                    return (w, result);
                }
                WindowState {
                    count: w.count + 1,
                    reset_at_ms: w.reset_at_ms,
                }
            }
            _ => WindowState {
                count: 1,
                reset_at_ms: now_ms.saturating_add(config.window_ms()),
            },
        };

        let allowed = state.count <= config.max_requests;
        let result = RateLimitResult {
            allowed,
            remaining: config.max_requests.saturating_sub(state.count),
            reset_at_ms: state.reset_at_ms,
            retry_after_secs: if allowed {
                0
            } else {
                ceil_secs(state.reset_at_ms - now_ms).max(1)
            },
        };
        (state, result)
    }
}

fn ceil_secs(ms: i64) -> u64 {
    u64::try_from(ms.max(0)).unwrap_or(0).div_ceil(1000)
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Rate limit store error
#[derive(Debug, thiserror::Error)]
#[error("Rate limit store error: {0}")]
pub struct RateLimitStoreError(pub String);

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Check and increment rate limit counter at the given instant
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> Result<RateLimitResult, RateLimitStoreError>;

    /// Drop windows that have already elapsed, returning how many were removed
    async fn sweep(&self, now_ms: i64) -> Result<usize, RateLimitStoreError>;
}

/// Process-local rate limit store backed by a concurrent map
///
/// Each key is updated under its shard lock, so concurrent hits on the same
/// key never lose increments.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: DashMap<String, WindowState>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn hit(&self, key: &str, config: &RateLimitConfig, now_ms: i64) -> RateLimitResult {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(WindowState {
                count: 0,
                reset_at_ms: i64::MIN,
            });
        let (state, result) = WindowState::hit(Some(*entry), config, now_ms);
        *entry = state;
        result
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> Result<RateLimitResult, RateLimitStoreError> {
        Ok(self.hit(key, config, now_ms))
    }

    async fn sweep(&self, now_ms: i64) -> Result<usize, RateLimitStoreError> {
        let before = self.windows.len();
        self.windows.retain(|_, w| now_ms < w.reset_at_ms);
        Ok(before.saturating_sub(self.windows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryRateLimitStore, RateLimitConfig, RateLimitStore, WindowState};

    const LOGIN: RateLimitConfig = RateLimitConfig::new(5, 15 * 60);

    #[test]
    fn test_first_hit_opens_window() {
        let (state, result) = WindowState::hit(None, &LOGIN, 1_000);
        assert_eq!(state.count, 1);
        assert_eq!(state.reset_at_ms, 1_000 + 15 * 60 * 1000);
        assert!(result.allowed);
        assert_eq!(result.remaining, 4);
    }

    #[test]
    fn test_rejects_after_max_without_incrementing() {
        let mut state = None;
        for _ in 0..5 {
            let (s, r) = WindowState::hit(state, &LOGIN, 0);
            assert!(r.allowed);
            state = Some(s);
        }

        let (s, r) = WindowState::hit(state, &LOGIN, 60_000);
        assert!(!r.allowed);
        assert_eq!(s.count, 5);
        assert_eq!(r.retry_after_secs, 14 * 60);

        let (s, _) = WindowState::hit(Some(s), &LOGIN, 61_000);
        assert_eq!(s.count, 5);
    }

    #[test]
    fn test_window_restarts_after_elapsed() {
        let full = WindowState {
            count: 5,
            reset_at_ms: 10_000,
        };
        let (s, r) = WindowState::hit(Some(full), &LOGIN, 10_000);
        assert!(r.allowed);
        assert_eq!(s.count, 1);
        assert_eq!(s.reset_at_ms, 10_000 + LOGIN.window_ms());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let full = WindowState {
            count: 5,
            reset_at_ms: 10_001,
        };
        let (_, r) = WindowState::hit(Some(full), &LOGIN, 10_000);
        assert_eq!(r.retry_after_secs, 1);
    }

    #[tokio::test]
    async fn test_store_keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        let cfg = RateLimitConfig::new(1, 60);

        assert!(store.check_and_increment("a", &cfg, 0).await.unwrap().allowed);
        assert!(!store.check_and_increment("a", &cfg, 1).await.unwrap().allowed);
        assert!(store.check_and_increment("b", &cfg, 1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_sweep_removes_elapsed_windows() {
        let store = InMemoryRateLimitStore::new();
        let cfg = RateLimitConfig::new(3, 1);

        store.check_and_increment("a", &cfg, 0).await.unwrap();
        store.check_and_increment("b", &cfg, 500).await.unwrap();

        assert_eq!(store.sweep(1_000).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }
}
