//! OTP Challenge Entity
//!
//! A single-use, time-boxed second-factor code. Only the keyed hash of the
//! code is stored.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{ChallengeId, IdentityId};

use crate::domain::value_object::otp_purpose::OtpPurpose;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub id: ChallengeId,
    pub identity_id: IdentityId,
    pub purpose: OtpPurpose,
    /// Hex HMAC-SHA256 of the code
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OtpChallenge {
    /// Create a new challenge
    ///
    /// TTL and ceiling are provided by the application layer (config).
    pub fn new(
        identity_id: IdentityId,
        purpose: OtpPurpose,
        code_hash: String,
        ttl: Duration,
        max_attempts: u32,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ChallengeId::new(),
            identity_id,
            purpose,
            code_hash,
            expires_at: now + ttl,
            used: false,
            attempts: 0,
            max_attempts,
            ip,
            user_agent,
            created_at: now,
        }
    }

    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Unused, unexpired and under the attempt ceiling
    #[inline]
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired_at(now) && !self.is_exhausted()
    }

    #[inline]
    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Rejections decided without looking at the submitted code
    pub fn ensure_verifiable_at(&self, now: DateTime<Utc>) -> AuthResult<()> {
        if self.used {
            return Err(AuthError::NoValidChallenge);
        }
        if self.is_expired_at(now) {
            return Err(AuthError::ChallengeExpired);
        }
        if self.is_exhausted() {
            return Err(AuthError::AttemptsExceeded);
        }
        Ok(())
    }
}
