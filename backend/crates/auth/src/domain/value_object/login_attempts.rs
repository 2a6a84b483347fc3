//! Login Attempt Tracking
//!
//! Pure state transitions for the failed-attempt counter and timed lockout.
//! The store applies the same rules atomically; see
//! [`IdentityRepository::record_login_failure`](crate::domain::repository::IdentityRepository).

use chrono::{DateTime, Duration, Utc};

/// Lockout thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures that trigger a lock
    pub threshold: u32,
    /// How long the lock lasts
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration: Duration::hours(2),
        }
    }
}

/// Failed-attempt counter and lock expiry of one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoginAttempts {
    pub failed: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginAttempts {
    /// Lock is in force at `now`
    #[inline]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// State after one more failed password
    ///
    /// A lock whose expiry has passed restarts the count at this failure.
    /// Reaching the threshold with no lock in force sets a new lock.
    pub fn after_failure(self, now: DateTime<Utc>, policy: &LockoutPolicy) -> Self {
        if self.is_locked_at(now) {
            return Self {
                failed: self.failed.saturating_add(1),
                locked_until: self.locked_until,
            };
        }

        let failed = match self.locked_until {
            Some(_) => 1,
            None => self.failed.saturating_add(1),
        };
        let locked_until = (failed >= policy.threshold).then(|| now + policy.duration);

        Self {
            failed,
            locked_until,
        }
    }

    /// State after a successful verification or administrative unlock
    #[inline]
    pub const fn cleared() -> Self {
        Self {
            failed: 0,
            locked_until: None,
        }
    }
}
