//! Repository Traits
//!
//! Interfaces for data persistence. Implementation is in infrastructure layer.
//!
//! Every state change that guards a security invariant is a single
//! conditional operation, so concurrent requests for the same identity
//! cannot interleave a read and a write.

use chrono::{DateTime, Utc};
use kernel::id::{ChallengeId, IdentityId, SessionId};
use platform::password::HashedPassword;
use uuid::Uuid;

use crate::domain::entity::{
    identity::Identity, otp_challenge::OtpChallenge, role_policy::RolePolicy, session::Session,
};
use crate::domain::value_object::{
    email::Email,
    login_attempts::{LockoutPolicy, LoginAttempts},
    otp_purpose::OtpPurpose,
    role_name::RoleName,
    security_flags::SecurityFlags,
    termination_reason::TerminationReason,
};
use crate::error::AuthResult;

/// Identity repository trait
#[trait_variant::make(IdentityRepository: Send)]
pub trait LocalIdentityRepository {
    /// Create a new identity
    async fn create(&self, identity: &Identity) -> AuthResult<()>;

    async fn find_by_id(&self, id: &IdentityId) -> AuthResult<Option<Identity>>;

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Identity>>;

    /// Apply [`LoginAttempts::after_failure`] atomically
    ///
    /// Returns the new state, or `None` when the identity does not exist.
    async fn record_login_failure(
        &self,
        id: &IdentityId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<Option<LoginAttempts>>;

    /// Clear counter and lock, and stamp the login time
    async fn record_login_success(&self, id: &IdentityId, now: DateTime<Utc>) -> AuthResult<()>;

    /// Administrative unlock; returns false when the identity does not exist
    async fn clear_login_failures(&self, id: &IdentityId, now: DateTime<Utc>) -> AuthResult<bool>;

    async fn update_password(
        &self,
        id: &IdentityId,
        password_hash: &HashedPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<bool>;

    /// Assign a role to many identities; returns the number updated
    async fn assign_role(
        &self,
        ids: &[IdentityId],
        role: &RoleName,
        now: DateTime<Utc>,
    ) -> AuthResult<u64>;

    async fn count_by_role(&self, role: &RoleName) -> AuthResult<u64>;
}

/// OTP challenge repository trait
#[trait_variant::make(OtpChallengeRepository: Send)]
pub trait LocalOtpChallengeRepository {
    /// Mark every unused challenge for the pair as used, then insert
    ///
    /// Both happen in one transaction. Returns how many were superseded.
    async fn replace_active(&self, challenge: &OtpChallenge) -> AuthResult<u64>;

    /// Most recent unused challenge for the pair
    async fn find_latest_unused(
        &self,
        identity_id: &IdentityId,
        purpose: OtpPurpose,
    ) -> AuthResult<Option<OtpChallenge>>;

    /// Count one mismatch if the challenge is still redeemable
    ///
    /// Returns the new attempt count, or `None` if the challenge was no
    /// longer redeemable at `now`.
    async fn record_mismatch(
        &self,
        id: &ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<u32>>;

    /// Single redemption: true only for the caller that flipped `used`
    async fn redeem(&self, id: &ChallengeId, now: DateTime<Utc>) -> AuthResult<bool>;

    /// Delete challenges that expired before `before`
    async fn purge_expired(&self, before: DateTime<Utc>) -> AuthResult<u64>;
}

/// Session repository trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    async fn create(&self, session: &Session) -> AuthResult<()>;

    async fn find_by_id(&self, id: &SessionId) -> AuthResult<Option<Session>>;

    async fn find_by_access_token_id(&self, token_id: &Uuid) -> AuthResult<Option<Session>>;

    async fn find_by_refresh_token_id(&self, token_id: &Uuid) -> AuthResult<Option<Session>>;

    /// Active sessions whose refresh token has not expired, newest first
    async fn list_active(
        &self,
        identity_id: &IdentityId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<Session>>;

    async fn count_active(&self, identity_id: &IdentityId, now: DateTime<Utc>) -> AuthResult<u64>;

    /// Update last activity of an active session
    async fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> AuthResult<()>;

    /// Replace the access-token identifier in place
    ///
    /// Succeeds only while the session is active, still bound to
    /// `refresh_token_id`, and its refresh expiry is after `now`.
    async fn rotate_access_token(
        &self,
        id: &SessionId,
        refresh_token_id: &Uuid,
        new_access_token_id: &Uuid,
        new_access_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool>;

    /// Terminate if still active; false if it already was not
    async fn terminate(
        &self,
        id: &SessionId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool>;

    /// Terminate every active session of an identity, optionally sparing one
    async fn terminate_all(
        &self,
        identity_id: &IdentityId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
        except: Option<&SessionId>,
        now: DateTime<Utc>,
    ) -> AuthResult<u64>;

    /// OR the given flags into the session's flags
    async fn raise_flags(&self, id: &SessionId, flags: SecurityFlags) -> AuthResult<()>;

    async fn clear_flags(&self, id: &SessionId) -> AuthResult<bool>;

    /// Terminate active sessions idle since before `idle_before`
    async fn expire_idle(&self, idle_before: DateTime<Utc>, now: DateTime<Utc>) -> AuthResult<u64>;

    /// Delete sessions terminated, or past refresh expiry, before `before`
    async fn purge_inert(&self, before: DateTime<Utc>) -> AuthResult<u64>;
}

/// Role policy repository trait
#[trait_variant::make(RolePolicyRepository: Send)]
pub trait LocalRolePolicyRepository {
    async fn find_by_name(&self, name: &RoleName) -> AuthResult<Option<RolePolicy>>;

    /// All policies ordered by hierarchy
    async fn list(&self) -> AuthResult<Vec<RolePolicy>>;

    /// Insert; fails with `RoleAlreadyExists` on a duplicate name
    async fn create(&self, policy: &RolePolicy) -> AuthResult<()>;

    /// Update the mutable fields of an existing policy
    async fn update(&self, policy: &RolePolicy) -> AuthResult<bool>;

    /// Delete a non-system policy
    async fn delete(&self, name: &RoleName) -> AuthResult<bool>;
}

/// Every repository the engine needs, served by one store
pub trait AuthStore:
    IdentityRepository
    + OtpChallengeRepository
    + SessionRepository
    + RolePolicyRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> AuthStore for T where
    T: IdentityRepository
        + OtpChallengeRepository
        + SessionRepository
        + RolePolicyRepository
        + Send
        + Sync
        + 'static
{
}
