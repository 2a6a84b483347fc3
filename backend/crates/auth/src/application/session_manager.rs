//! Session Manager
//!
//! Issues, validates, refreshes and terminates persisted sessions. A token
//! is only as good as its session record: every validation goes back to
//! the store, so server-side revocation takes effect immediately.
//!
//! ```text
//! Active --refresh--> Active (same record, new access-token id)
//!    |                   |
//!    +----terminate------+--> Terminated(reason)
//!
//! Active --clock passes access expiry--> Expired (no mutation)
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;

use kernel::id::{IdentityId, SessionId};
use platform::client::ClientContext;
use uuid::Uuid;

use crate::application::config::{AuthConfig, chrono_duration};
use crate::application::permission_resolver::PermissionResolver;
use crate::application::timeout::within;
use crate::application::token::{AccessClaims, TokenService, parse_token_id};
use crate::domain::entity::identity::Identity;
use crate::domain::entity::session::{Session, SessionInfo, SessionOrigin};
use crate::domain::repository::{IdentityRepository, RolePolicyRepository, SessionRepository};
use crate::domain::value_object::{
    permission::PermissionSet, security_flags::SecurityFlags,
    termination_reason::TerminationReason,
};
use crate::error::{AuthError, AuthResult};

/// Tokens handed out when a session is created
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub session_id: SessionId,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub security_flags: SecurityFlags,
}

/// Result of a refresh: the same session, a new access token
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub session_id: SessionId,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
}

/// An authenticated request's identity and session
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub identity: Identity,
    pub session: Session,
    pub claims: AccessClaims,
}

/// Session manager
pub struct SessionManager<S, I, R>
where
    S: SessionRepository,
    I: IdentityRepository,
    R: RolePolicyRepository,
{
    sessions: Arc<S>,
    identities: Arc<I>,
    permissions: Arc<PermissionResolver<R>>,
    tokens: Arc<TokenService>,
    config: Arc<AuthConfig>,
}

impl<S, I, R> SessionManager<S, I, R>
where
    S: SessionRepository,
    I: IdentityRepository,
    R: RolePolicyRepository,
{
    pub fn new(
        sessions: Arc<S>,
        identities: Arc<I>,
        permissions: Arc<PermissionResolver<R>>,
        tokens: Arc<TokenService>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            sessions,
            identities,
            permissions,
            tokens,
            config,
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Persist a new session and sign its token pair
    ///
    /// Exceeding the concurrent-session ceiling does not block creation;
    /// it flags the new session.
    pub async fn create(
        &self,
        identity: &Identity,
        client: &ClientContext,
        device_info: Option<String>,
    ) -> AuthResult<SessionTokens> {
        let permissions = self.permissions.resolve(&identity.role).await?;

        let origin = SessionOrigin {
            ip: client.ip_string(),
            user_agent: client.user_agent.clone(),
            device_info,
            device_fingerprint: client.fingerprint().to_vec(),
        };
        let mut session = Session::new(
            identity.id,
            origin,
            chrono_duration(self.config.access_token_ttl),
            chrono_duration(self.config.refresh_token_ttl),
        );

        let budget = self.config.store_timeout;
        within(budget, self.sessions.create(&session)).await?;

        let active = within(
            budget,
            self.sessions.count_active(&identity.id, session.created_at),
        )
        .await?;
        if active > u64::from(self.config.concurrent_session_ceiling) {
            let flags = SecurityFlags {
                concurrent_sessions: true,
                ..SecurityFlags::NONE
            };
            within(budget, self.sessions.raise_flags(&session.id, flags)).await?;
            session.security_flags = session.security_flags.merge(flags);
            tracing::warn!(
                identity_id = %identity.id,
                session_id = %session.id,
                active,
                ceiling = self.config.concurrent_session_ceiling,
                "Concurrent session ceiling exceeded"
            );
        }

        let tokens = self.sign_pair(identity, &permissions, &session)?;

        tracing::info!(
            identity_id = %identity.id,
            session_id = %session.id,
            ip = session.ip.as_deref().unwrap_or("unknown"),
            "Session created"
        );
        Ok(tokens)
    }

    fn sign_pair(
        &self,
        identity: &Identity,
        permissions: &PermissionSet,
        session: &Session,
    ) -> AuthResult<SessionTokens> {
        Ok(SessionTokens {
            session_id: session.id,
            access_token: self.tokens.issue_access(
                identity,
                permissions,
                &session.access_token_id,
                session.access_expires_at,
            )?,
            refresh_token: self.tokens.issue_refresh(
                identity,
                &session.refresh_token_id,
                session.refresh_expires_at,
            )?,
            access_expires_at: session.access_expires_at,
            refresh_expires_at: session.refresh_expires_at,
            security_flags: session.security_flags,
        })
    }

    // ========================================================================
    // Validate
    // ========================================================================

    /// Authenticate an access token against its session record
    pub async fn validate(&self, access_token: &str) -> AuthResult<ValidatedSession> {
        let claims = self.tokens.decode_access(access_token)?;
        let token_id = parse_token_id(&claims.jti)?;
        let budget = self.config.store_timeout;
        let now = Utc::now();

        let session = within(budget, self.sessions.find_by_access_token_id(&token_id))
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if !session.is_active || session.terminated_at.is_some() {
            return Err(AuthError::SessionNotFound);
        }
        if !session.is_valid_at(now) {
            return Err(AuthError::SessionExpired);
        }
        if session.identity_id.to_string() != claims.sub {
            return Err(AuthError::InvalidToken);
        }
        self.expire_if_idle(&session, now).await?;

        let identity = self.load_identity(&session.identity_id).await?;

        within(budget, self.sessions.touch(&session.id, now)).await?;

        Ok(ValidatedSession {
            identity,
            session,
            claims,
        })
    }

    async fn expire_if_idle(&self, session: &Session, now: DateTime<Utc>) -> AuthResult<()> {
        let timeout = chrono_duration(self.config.session_inactivity_timeout);
        if !session.is_idle_at(now, timeout) {
            return Ok(());
        }

        within(
            self.config.store_timeout,
            self.sessions
                .terminate(&session.id, TerminationReason::Inactivity, None, now),
        )
        .await?;
        tracing::info!(
            identity_id = %session.identity_id,
            session_id = %session.id,
            "Session terminated after inactivity"
        );
        Err(AuthError::SessionExpired)
    }

    async fn load_identity(&self, id: &IdentityId) -> AuthResult<Identity> {
        let identity = within(self.config.store_timeout, self.identities.find_by_id(id))
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        if !identity.is_active() {
            return Err(AuthError::AccountInactive);
        }
        Ok(identity)
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Rotate the access token of the session the refresh token belongs to
    ///
    /// The session record is updated in place; no new session is created.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedAccess> {
        let claims = self.tokens.decode_refresh(refresh_token)?;
        let refresh_id = parse_token_id(&claims.jti)?;
        let budget = self.config.store_timeout;
        let now = Utc::now();

        let session = within(budget, self.sessions.find_by_refresh_token_id(&refresh_id))
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.identity_id.to_string() != claims.sub {
            tracing::warn!(session_id = %session.id, "Refresh token subject mismatch");
            return Err(AuthError::InvalidToken);
        }
        if !session.is_active || session.terminated_at.is_some() {
            return Err(AuthError::SessionNotFound);
        }
        if !session.is_refreshable_at(now) {
            return Err(AuthError::SessionExpired);
        }
        self.expire_if_idle(&session, now).await?;

        let identity = self.load_identity(&session.identity_id).await?;
        let permissions = self.permissions.resolve(&identity.role).await?;

        let access_token_id = Uuid::new_v4();
        let access_expires_at = now + chrono_duration(self.config.access_token_ttl);

        let rotated = within(
            budget,
            self.sessions.rotate_access_token(
                &session.id,
                &refresh_id,
                &access_token_id,
                access_expires_at,
                now,
            ),
        )
        .await?;
        if !rotated {
            // Terminated or expired between the read and the update
            return Err(AuthError::SessionNotFound);
        }

        let access_token =
            self.tokens
                .issue_access(&identity, &permissions, &access_token_id, access_expires_at)?;

        tracing::info!(
            identity_id = %identity.id,
            session_id = %session.id,
            "Access token refreshed"
        );
        Ok(RefreshedAccess {
            session_id: session.id,
            access_token,
            access_expires_at,
        })
    }

    // ========================================================================
    // Terminate
    // ========================================================================

    /// Terminate one session; terminating an already-terminated session is
    /// a no-op
    pub async fn terminate(
        &self,
        session_id: &SessionId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
    ) -> AuthResult<()> {
        let budget = self.config.store_timeout;
        let now = Utc::now();

        let terminated = within(
            budget,
            self.sessions.terminate(session_id, reason, actor, now),
        )
        .await?;

        if terminated {
            tracing::info!(
                session_id = %session_id,
                reason = %reason,
                actor = actor.map(|a| a.to_string()).as_deref(),
                "Session terminated"
            );
            return Ok(());
        }

        // Not active: either already terminated or never existed
        within(budget, self.sessions.find_by_id(session_id))
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        tracing::debug!(session_id = %session_id, "Session already terminated");
        Ok(())
    }

    /// Terminate every active session of an identity, optionally sparing one
    pub async fn terminate_all(
        &self,
        identity_id: &IdentityId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
        except: Option<&SessionId>,
    ) -> AuthResult<u64> {
        let count = within(
            self.config.store_timeout,
            self.sessions
                .terminate_all(identity_id, reason, actor, except, Utc::now()),
        )
        .await?;

        tracing::info!(
            identity_id = %identity_id,
            reason = %reason,
            count,
            "Sessions terminated"
        );
        Ok(count)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn find(&self, session_id: &SessionId) -> AuthResult<Session> {
        within(self.config.store_timeout, self.sessions.find_by_id(session_id))
            .await?
            .ok_or(AuthError::SessionNotFound)
    }

    /// Active sessions of an identity, newest first
    pub async fn list_active(
        &self,
        identity_id: &IdentityId,
        current: Option<&SessionId>,
    ) -> AuthResult<Vec<SessionInfo>> {
        let sessions = within(
            self.config.store_timeout,
            self.sessions.list_active(identity_id, Utc::now()),
        )
        .await?;

        Ok(sessions
            .iter()
            .map(|s| SessionInfo {
                is_current: current == Some(&s.id),
                ..SessionInfo::from(s)
            })
            .collect())
    }

    /// Reset a session's security flags
    pub async fn clear_flags(&self, session_id: &SessionId) -> AuthResult<()> {
        let cleared =
            within(self.config.store_timeout, self.sessions.clear_flags(session_id)).await?;
        if !cleared {
            return Err(AuthError::SessionNotFound);
        }
        tracing::info!(session_id = %session_id, "Session security flags cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::IdentityRepository;
    use crate::domain::value_object::{email::Email, role_name::RoleName};
    use crate::infra::cache::InMemoryPermissionCache;
    use crate::infra::memory::MemoryAuthRepository;
    use chrono::Duration;
    use platform::password::ClearTextPassword;

    type Manager = SessionManager<MemoryAuthRepository, MemoryAuthRepository, MemoryAuthRepository>;

    async fn setup() -> (Manager, Arc<MemoryAuthRepository>, Identity) {
        let config = Arc::new(AuthConfig::with_random_secrets());
        let repo = Arc::new(MemoryAuthRepository::with_system_roles());
        let hash = ClearTextPassword::new("correct horse battery".to_string())
            .unwrap()
            .hash(None)
            .unwrap();
        let identity = Identity::new(
            Email::new("linus@example.com").unwrap(),
            hash,
            RoleName::from_db("employee"),
        );
        IdentityRepository::create(repo.as_ref(), &identity).await.unwrap();

        let resolver = Arc::new(PermissionResolver::new(
            repo.clone(),
            Arc::new(InMemoryPermissionCache::new()),
            config.clone(),
        ));
        let manager = SessionManager::new(
            repo.clone(),
            repo.clone(),
            resolver,
            Arc::new(TokenService::new(&config)),
            config,
        );
        (manager, repo, identity)
    }

    fn client() -> ClientContext {
        ClientContext::new("10.0.0.1".parse().ok(), Some("UA/1".to_string()))
    }

    #[tokio::test]
    async fn test_create_then_validate() {
        let (manager, _, identity) = setup().await;
        let tokens = manager.create(&identity, &client(), None).await.unwrap();

        let validated = manager.validate(&tokens.access_token).await.unwrap();
        assert_eq!(validated.session.id, tokens.session_id);
        assert_eq!(validated.identity.id, identity.id);
        assert_eq!(validated.claims.role, "employee");
    }

    #[tokio::test]
    async fn test_refresh_keeps_session() {
        let (manager, repo, identity) = setup().await;
        let tokens = manager.create(&identity, &client(), None).await.unwrap();

        let refreshed = manager.refresh(&tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed.session_id, tokens.session_id);
        assert_eq!(repo.session_count(&identity.id), 1);

        // The old access token no longer maps to the session
        assert!(matches!(
            manager.validate(&tokens.access_token).await,
            Err(AuthError::SessionNotFound)
        ));
        manager.validate(&refreshed.access_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminated_session_rejected() {
        let (manager, _, identity) = setup().await;
        let tokens = manager.create(&identity, &client(), None).await.unwrap();

        manager
            .terminate(&tokens.session_id, TerminationReason::Logout, None)
            .await
            .unwrap();
        // Idempotent
        manager
            .terminate(&tokens.session_id, TerminationReason::Logout, None)
            .await
            .unwrap();

        assert!(matches!(
            manager.validate(&tokens.access_token).await,
            Err(AuthError::SessionNotFound)
        ));
        assert!(matches!(
            manager.refresh(&tokens.refresh_token).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_terminate_unknown_session() {
        let (manager, _, _) = setup().await;
        assert!(matches!(
            manager
                .terminate(&SessionId::new(), TerminationReason::Logout, None)
                .await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let (manager, repo, identity) = setup().await;
        let tokens = manager.create(&identity, &client(), None).await.unwrap();
        repo.with_session(&tokens.session_id, |s| {
            s.last_activity_at = Utc::now() - Duration::minutes(31);
        });

        assert!(matches!(
            manager.validate(&tokens.access_token).await,
            Err(AuthError::SessionExpired)
        ));
        let session = manager.find(&tokens.session_id).await.unwrap();
        assert!(!session.is_active);
        assert_eq!(session.termination_reason, Some(TerminationReason::Inactivity));
    }

    #[tokio::test]
    async fn test_expired_access_record() {
        let (manager, repo, identity) = setup().await;
        let tokens = manager.create(&identity, &client(), None).await.unwrap();
        repo.with_session(&tokens.session_id, |s| {
            s.access_expires_at = Utc::now() - Duration::seconds(1);
        });

        assert!(matches!(
            manager.validate(&tokens.access_token).await,
            Err(AuthError::SessionExpired)
        ));
        // Still refreshable
        manager.refresh(&tokens.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_fourth_session_flagged() {
        let (manager, _, identity) = setup().await;
        let mut created = Vec::new();
        for _ in 0..4 {
            created.push(manager.create(&identity, &client(), None).await.unwrap());
        }

        assert!(created[..3].iter().all(|t| !t.security_flags.concurrent_sessions));
        assert!(created[3].security_flags.concurrent_sessions);

        let listed = manager.list_active(&identity.id, Some(&created[0].session_id)).await.unwrap();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed.iter().filter(|s| s.is_current).count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_all_spares_current() {
        let (manager, _, identity) = setup().await;
        let keep = manager.create(&identity, &client(), None).await.unwrap();
        manager.create(&identity, &client(), None).await.unwrap();
        manager.create(&identity, &client(), None).await.unwrap();

        let count = manager
            .terminate_all(
                &identity.id,
                TerminationReason::UserAction,
                None,
                Some(&keep.session_id),
            )
            .await
            .unwrap();
        assert_eq!(count, 2);
        manager.validate(&keep.access_token).await.unwrap();
    }
}
