//! In-memory repository
//!
//! Implements every repository trait over one mutex-guarded state. Each
//! method does its whole read-modify-write under the lock, which gives the
//! same conditional-update guarantees as the SQL statements in
//! [`super::postgres`]. Used by tests and local runs without a database.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use kernel::id::{ChallengeId, IdentityId, SessionId};
use platform::password::HashedPassword;
use uuid::Uuid;

use crate::domain::entity::{
    identity::Identity, otp_challenge::OtpChallenge, role_policy::RolePolicy, session::Session,
};
use crate::domain::repository::{
    IdentityRepository, OtpChallengeRepository, RolePolicyRepository, SessionRepository,
};
use crate::domain::value_object::{
    email::Email,
    login_attempts::{LockoutPolicy, LoginAttempts},
    otp_purpose::OtpPurpose,
    role_name::RoleName,
    security_flags::SecurityFlags,
    termination_reason::TerminationReason,
};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Default)]
struct State {
    identities: HashMap<IdentityId, Identity>,
    challenges: HashMap<ChallengeId, OtpChallenge>,
    sessions: HashMap<SessionId, Session>,
    roles: BTreeMap<RoleName, RolePolicy>,
}

/// In-memory auth repository
#[derive(Debug, Default)]
pub struct MemoryAuthRepository {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository seeded with the system roles
    pub fn with_system_roles() -> Self {
        let repo = Self::new();
        {
            let mut state = repo.lock();
            for policy in RolePolicy::system_defaults() {
                state.roles.insert(policy.name.clone(), policy);
            }
        }
        repo
    }

    /// Make every call fail with `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Edit a stored identity in place
    pub fn with_identity(&self, id: &IdentityId, f: impl FnOnce(&mut Identity)) {
        if let Some(identity) = self.lock().identities.get_mut(id) {
            f(identity);
        }
    }

    /// Edit a stored challenge in place
    pub fn with_challenge(&self, id: &ChallengeId, f: impl FnOnce(&mut OtpChallenge)) {
        if let Some(challenge) = self.lock().challenges.get_mut(id) {
            f(challenge);
        }
    }

    /// Edit a stored session in place
    pub fn with_session(&self, id: &SessionId, f: impl FnOnce(&mut Session)) {
        if let Some(session) = self.lock().sessions.get_mut(id) {
            f(session);
        }
    }

    /// Session records of an identity, in any state
    pub fn session_count(&self, identity_id: &IdentityId) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.identity_id == *identity_id)
            .count()
    }

    /// Challenges for the pair that could still be redeemed now
    pub fn redeemable_challenges(&self, identity_id: &IdentityId, purpose: OtpPurpose) -> usize {
        let now = Utc::now();
        self.lock()
            .challenges
            .values()
            .filter(|c| c.identity_id == *identity_id && c.purpose == purpose)
            .filter(|c| c.is_redeemable_at(now))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> AuthResult<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::StoreUnavailable("memory store offline".to_string()));
        }
        Ok(self.lock())
    }
}

fn terminate_session(
    session: &mut Session,
    reason: TerminationReason,
    actor: Option<&IdentityId>,
    now: DateTime<Utc>,
) -> bool {
    if !session.is_active {
        return false;
    }
    session.is_active = false;
    session.terminated_at = Some(now);
    session.termination_reason = Some(reason);
    session.terminated_by = actor.copied();
    true
}

// ============================================================================
// Identity Repository Implementation
// ============================================================================

impl IdentityRepository for MemoryAuthRepository {
    async fn create(&self, identity: &Identity) -> AuthResult<()> {
        let mut state = self.state()?;
        if state.identities.values().any(|i| i.email == identity.email) {
            return Err(AuthError::ValidationFailed(
                "email is already registered".to_string(),
            ));
        }
        state.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &IdentityId) -> AuthResult<Option<Identity>> {
        Ok(self.state()?.identities.get(id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Identity>> {
        Ok(self
            .state()?
            .identities
            .values()
            .find(|i| i.email == *email)
            .cloned())
    }

    async fn record_login_failure(
        &self,
        id: &IdentityId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<Option<LoginAttempts>> {
        let mut state = self.state()?;
        Ok(state.identities.get_mut(id).map(|identity| {
            identity.attempts = identity.attempts.after_failure(now, policy);
            identity.updated_at = now;
            identity.attempts
        }))
    }

    async fn record_login_success(&self, id: &IdentityId, now: DateTime<Utc>) -> AuthResult<()> {
        if let Some(identity) = self.state()?.identities.get_mut(id) {
            identity.attempts = LoginAttempts::cleared();
            identity.last_login_at = Some(now);
            identity.updated_at = now;
        }
        Ok(())
    }

    async fn clear_login_failures(&self, id: &IdentityId, now: DateTime<Utc>) -> AuthResult<bool> {
        let mut state = self.state()?;
        Ok(match state.identities.get_mut(id) {
            Some(identity) => {
                identity.attempts = LoginAttempts::cleared();
                identity.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn update_password(
        &self,
        id: &IdentityId,
        password_hash: &HashedPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let mut state = self.state()?;
        Ok(match state.identities.get_mut(id) {
            Some(identity) => {
                identity.password_hash = password_hash.clone();
                identity.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn assign_role(
        &self,
        ids: &[IdentityId],
        role: &RoleName,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let mut state = self.state()?;
        let mut updated = 0;
        for id in ids {
            if let Some(identity) = state.identities.get_mut(id) {
                identity.role = role.clone();
                identity.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_by_role(&self, role: &RoleName) -> AuthResult<u64> {
        let state = self.state()?;
        Ok(state.identities.values().filter(|i| i.role == *role).count() as u64)
    }
}

// ============================================================================
// OTP Challenge Repository Implementation
// ============================================================================

impl OtpChallengeRepository for MemoryAuthRepository {
    async fn replace_active(&self, challenge: &OtpChallenge) -> AuthResult<u64> {
        let mut state = self.state()?;
        let mut superseded = 0;
        for existing in state.challenges.values_mut() {
            if existing.identity_id == challenge.identity_id
                && existing.purpose == challenge.purpose
                && !existing.used
            {
                existing.used = true;
                superseded += 1;
            }
        }
        state.challenges.insert(challenge.id, challenge.clone());
        Ok(superseded)
    }

    async fn find_latest_unused(
        &self,
        identity_id: &IdentityId,
        purpose: OtpPurpose,
    ) -> AuthResult<Option<OtpChallenge>> {
        Ok(self
            .state()?
            .challenges
            .values()
            .filter(|c| c.identity_id == *identity_id && c.purpose == purpose && !c.used)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn record_mismatch(
        &self,
        id: &ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<u32>> {
        let mut state = self.state()?;
        Ok(state
            .challenges
            .get_mut(id)
            .filter(|c| c.is_redeemable_at(now))
            .map(|c| {
                c.attempts += 1;
                c.attempts
            }))
    }

    async fn redeem(&self, id: &ChallengeId, now: DateTime<Utc>) -> AuthResult<bool> {
        let mut state = self.state()?;
        Ok(match state.challenges.get_mut(id) {
            Some(c) if c.is_redeemable_at(now) => {
                c.used = true;
                true
            }
            _ => false,
        })
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.state()?;
        let count = state.challenges.len();
        state.challenges.retain(|_, c| c.expires_at >= before);
        Ok((count - state.challenges.len()) as u64)
    }
}

// ============================================================================
// Session Repository Implementation
// ============================================================================

impl SessionRepository for MemoryAuthRepository {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        self.state()?.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> AuthResult<Option<Session>> {
        Ok(self.state()?.sessions.get(id).cloned())
    }

    async fn find_by_access_token_id(&self, token_id: &Uuid) -> AuthResult<Option<Session>> {
        Ok(self
            .state()?
            .sessions
            .values()
            .find(|s| s.access_token_id == *token_id)
            .cloned())
    }

    async fn find_by_refresh_token_id(&self, token_id: &Uuid) -> AuthResult<Option<Session>> {
        Ok(self
            .state()?
            .sessions
            .values()
            .find(|s| s.refresh_token_id == *token_id)
            .cloned())
    }

    async fn list_active(
        &self,
        identity_id: &IdentityId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<Session>> {
        let state = self.state()?;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.identity_id == *identity_id && s.is_refreshable_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn count_active(&self, identity_id: &IdentityId, now: DateTime<Utc>) -> AuthResult<u64> {
        let state = self.state()?;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.identity_id == *identity_id && s.is_refreshable_at(now))
            .count() as u64)
    }

    async fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> AuthResult<()> {
        if let Some(session) = self.state()?.sessions.get_mut(id) {
            if session.is_active {
                session.last_activity_at = now;
            }
        }
        Ok(())
    }

    async fn rotate_access_token(
        &self,
        id: &SessionId,
        refresh_token_id: &Uuid,
        new_access_token_id: &Uuid,
        new_access_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let mut state = self.state()?;
        Ok(match state.sessions.get_mut(id) {
            Some(s) if s.refresh_token_id == *refresh_token_id && s.is_refreshable_at(now) => {
                s.access_token_id = *new_access_token_id;
                s.access_expires_at = new_access_expires_at;
                s.last_activity_at = now;
                true
            }
            _ => false,
        })
    }

    async fn terminate(
        &self,
        id: &SessionId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let mut state = self.state()?;
        Ok(state
            .sessions
            .get_mut(id)
            .is_some_and(|s| terminate_session(s, reason, actor, now)))
    }

    async fn terminate_all(
        &self,
        identity_id: &IdentityId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
        except: Option<&SessionId>,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let mut state = self.state()?;
        let mut count = 0;
        for session in state.sessions.values_mut() {
            if session.identity_id != *identity_id || except == Some(&session.id) {
                continue;
            }
            if terminate_session(session, reason, actor, now) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn raise_flags(&self, id: &SessionId, flags: SecurityFlags) -> AuthResult<()> {
        if let Some(session) = self.state()?.sessions.get_mut(id) {
            session.security_flags = session.security_flags.merge(flags);
        }
        Ok(())
    }

    async fn clear_flags(&self, id: &SessionId) -> AuthResult<bool> {
        let mut state = self.state()?;
        Ok(match state.sessions.get_mut(id) {
            Some(session) => {
                session.security_flags = SecurityFlags::NONE;
                true
            }
            None => false,
        })
    }

    async fn expire_idle(&self, idle_before: DateTime<Utc>, now: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.state()?;
        let mut count = 0;
        for session in state.sessions.values_mut() {
            if session.last_activity_at < idle_before
                && terminate_session(session, TerminationReason::Inactivity, None, now)
            {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_inert(&self, before: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.state()?;
        let count = state.sessions.len();
        state.sessions.retain(|_, s| {
            let terminated_long_ago = !s.is_active && s.terminated_at.is_some_and(|t| t < before);
            let expired_long_ago = s.refresh_expires_at < before;
            !(terminated_long_ago || expired_long_ago)
        });
        Ok((count - state.sessions.len()) as u64)
    }
}

// ============================================================================
// Role Policy Repository Implementation
// ============================================================================

impl RolePolicyRepository for MemoryAuthRepository {
    async fn find_by_name(&self, name: &RoleName) -> AuthResult<Option<RolePolicy>> {
        Ok(self.state()?.roles.get(name).cloned())
    }

    async fn list(&self) -> AuthResult<Vec<RolePolicy>> {
        let mut roles: Vec<RolePolicy> = self.state()?.roles.values().cloned().collect();
        roles.sort_by_key(|r| r.hierarchy);
        Ok(roles)
    }

    async fn create(&self, policy: &RolePolicy) -> AuthResult<()> {
        let mut state = self.state()?;
        if state.roles.contains_key(&policy.name) {
            return Err(AuthError::RoleAlreadyExists(policy.name.to_string()));
        }
        state.roles.insert(policy.name.clone(), policy.clone());
        Ok(())
    }

    async fn update(&self, policy: &RolePolicy) -> AuthResult<bool> {
        let mut state = self.state()?;
        Ok(match state.roles.get_mut(&policy.name) {
            Some(existing) => {
                *existing = policy.clone();
                true
            }
            None => false,
        })
    }

    async fn delete(&self, name: &RoleName) -> AuthResult<bool> {
        let mut state = self.state()?;
        if state.roles.get(name).is_some_and(|r| !r.is_system) {
            state.roles.remove(name);
            return Ok(true);
        }
        Ok(false)
    }
}
