//! Session Security Flags

use serde::{Deserialize, Serialize};

/// Independently settable anomaly markers on a session
///
/// Flags only accumulate: [`SecurityFlags::merge`] is a bitwise OR. They are
/// cleared by an explicit administrative action, never as a side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFlags {
    pub suspicious_activity: bool,
    pub multiple_failed_attempts: bool,
    pub unusual_location: bool,
    pub concurrent_sessions: bool,
}

impl SecurityFlags {
    pub const NONE: Self = Self {
        suspicious_activity: false,
        multiple_failed_attempts: false,
        unusual_location: false,
        concurrent_sessions: false,
    };

    /// Union of two flag sets
    #[inline]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            suspicious_activity: self.suspicious_activity || other.suspicious_activity,
            multiple_failed_attempts: self.multiple_failed_attempts
                || other.multiple_failed_attempts,
            unusual_location: self.unusual_location || other.unusual_location,
            concurrent_sessions: self.concurrent_sessions || other.concurrent_sessions,
        }
    }

    #[inline]
    pub const fn any(&self) -> bool {
        self.suspicious_activity
            || self.multiple_failed_attempts
            || self.unusual_location
            || self.concurrent_sessions
    }

    /// Whether `other` would set a flag that is not already set
    #[inline]
    pub fn would_raise(&self, other: &Self) -> bool {
        self.merge(*other) != *self
    }
}
