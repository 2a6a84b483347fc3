//! Identity Entity
//!
//! A credential holder. Mutated only through the credential verifier and
//! administrative operations.

use chrono::{DateTime, Utc};
use kernel::id::IdentityId;
use platform::password::HashedPassword;

use crate::domain::value_object::{
    email::Email, identity_status::IdentityStatus, login_attempts::LoginAttempts,
    role_name::RoleName,
};

#[derive(Debug, Clone)]
pub struct Identity {
    pub id: IdentityId,
    /// Unique, lowercased
    pub email: Email,
    pub password_hash: HashedPassword,
    pub role: RoleName,
    pub status: IdentityStatus,
    /// Failed-attempt counter and lock expiry
    pub attempts: LoginAttempts,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new active identity
    pub fn new(email: Email, password_hash: HashedPassword, role: RoleName) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::new(),
            email,
            password_hash,
            role,
            status: IdentityStatus::Active,
            attempts: LoginAttempts::default(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.can_login()
    }

    #[inline]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.attempts.is_locked_at(now)
    }
}
