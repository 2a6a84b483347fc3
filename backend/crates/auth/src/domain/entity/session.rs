//! Session Entity
//!
//! Server-persisted record of one authenticated login, bound to an
//! access/refresh token pair by token identifiers.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{IdentityId, SessionId};
use uuid::Uuid;

use crate::domain::value_object::{
    security_flags::SecurityFlags, termination_reason::TerminationReason,
};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub identity_id: IdentityId,
    /// `jti` of the current access token; replaced on refresh
    pub access_token_id: Uuid,
    /// `jti` of the refresh token; fixed for the session's lifetime
    pub refresh_token_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
    /// SHA-256 of the User-Agent at creation
    pub device_fingerprint: Vec<u8>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<TerminationReason>,
    pub terminated_by: Option<IdentityId>,
    pub security_flags: SecurityFlags,
}

/// Origin of a new session
#[derive(Debug, Clone, Default)]
pub struct SessionOrigin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
    pub device_fingerprint: Vec<u8>,
}

impl Session {
    /// Create a new active session
    ///
    /// TTLs are provided by the application layer (config), not hard-coded here.
    pub fn new(
        identity_id: IdentityId,
        origin: SessionOrigin,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            identity_id,
            access_token_id: Uuid::new_v4(),
            refresh_token_id: Uuid::new_v4(),
            access_expires_at: now + access_ttl,
            refresh_expires_at: now + refresh_ttl,
            is_active: true,
            ip: origin.ip,
            user_agent: origin.user_agent,
            device_info: origin.device_info,
            device_fingerprint: origin.device_fingerprint,
            last_activity_at: now,
            created_at: now,
            terminated_at: None,
            termination_reason: None,
            terminated_by: None,
            security_flags: SecurityFlags::NONE,
        }
    }

    /// Active, access token unexpired, and never terminated
    #[inline]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.access_expires_at && self.terminated_at.is_none()
    }

    /// Can still mint access tokens
    #[inline]
    pub fn is_refreshable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.refresh_expires_at && self.terminated_at.is_none()
    }

    #[inline]
    pub fn is_idle_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity_at >= timeout
    }
}

/// Session info for API responses (non-sensitive)
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub ip: Option<String>,
    pub device_info: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub security_flags: SecurityFlags,
    pub is_current: bool,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            ip: session.ip.clone(),
            device_info: session.device_info.clone(),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            security_flags: session.security_flags,
            is_current: false, // Set by caller
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            IdentityId::new(),
            SessionOrigin::default(),
            Duration::hours(1),
            Duration::days(7),
        )
    }

    #[test]
    fn test_validity_is_clock_based() {
        let s = session();
        assert!(s.is_valid_at(s.created_at));
        assert!(!s.is_valid_at(s.access_expires_at));
        assert!(s.is_refreshable_at(s.access_expires_at));
        assert!(!s.is_refreshable_at(s.refresh_expires_at));
    }

    #[test]
    fn test_terminated_is_invalid() {
        let mut s = session();
        s.terminated_at = Some(s.created_at);
        assert!(!s.is_valid_at(s.created_at));
        assert!(!s.is_refreshable_at(s.created_at));
    }

    #[test]
    fn test_idle() {
        let s = session();
        let timeout = Duration::minutes(30);
        assert!(!s.is_idle_at(s.created_at + Duration::minutes(29), timeout));
        assert!(s.is_idle_at(s.created_at + Duration::minutes(30), timeout));
    }
}
