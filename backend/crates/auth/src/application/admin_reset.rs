//! Administrative Reset
//!
//! Explicit operator actions that undo terminal security states: clearing a
//! lockout, clearing session flags, revoking someone else's session. Each
//! requires the actor's role to manage the target's role.

use chrono::Utc;
use std::sync::Arc;

use kernel::id::{IdentityId, SessionId};
use platform::rate_limit::RateLimitStore;

use crate::application::engine::AuthEngine;
use crate::application::timeout::within;
use crate::domain::entity::identity::Identity;
use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::domain::value_object::termination_reason::TerminationReason;
use crate::error::{AuthError, AuthResult};

/// Administrative reset use case
pub struct AdministrativeReset<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    engine: Arc<AuthEngine<R, L>>,
}

impl<R, L> AdministrativeReset<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(engine: Arc<AuthEngine<R, L>>) -> Self {
        Self { engine }
    }

    /// Clear the failed-attempt counter and lock of `target_id`
    pub async fn unlock(&self, actor: &Identity, target_id: &IdentityId) -> AuthResult<()> {
        let target = self.load_managed(actor, target_id).await?;

        let cleared = within(
            self.engine.config.store_timeout,
            self.engine.store.clear_login_failures(&target.id, Utc::now()),
        )
        .await?;
        if !cleared {
            return Err(AuthError::IdentityNotFound);
        }

        tracing::info!(
            actor_id = %actor.id,
            identity_id = %target.id,
            previous_failures = target.attempts.failed,
            "Identity unlocked"
        );
        Ok(())
    }

    /// Clear the security flags of a session
    pub async fn clear_flags(&self, actor: &Identity, session_id: &SessionId) -> AuthResult<()> {
        let session = self.engine.sessions.find(session_id).await?;
        self.load_managed(actor, &session.identity_id).await?;

        self.engine.sessions.clear_flags(session_id).await?;
        tracing::info!(
            actor_id = %actor.id,
            session_id = %session_id,
            "Security flags cleared by administrator"
        );
        Ok(())
    }

    /// Terminate a session owned by the actor, or by someone they manage
    pub async fn terminate_session(
        &self,
        actor: &Identity,
        session_id: &SessionId,
    ) -> AuthResult<()> {
        let session = self.engine.sessions.find(session_id).await?;

        let reason = if session.identity_id == actor.id {
            TerminationReason::UserAction
        } else {
            self.load_managed(actor, &session.identity_id)
                .await
                .map_err(|e| match e {
                    // Do not reveal that a foreign session exists
                    AuthError::IdentityNotFound | AuthError::InsufficientPermission => {
                        AuthError::SessionNotFound
                    }
                    other => other,
                })?;
            TerminationReason::AdminAction
        };

        self.engine
            .sessions
            .terminate(session_id, reason, Some(&actor.id))
            .await
    }

    async fn load_managed(&self, actor: &Identity, target_id: &IdentityId) -> AuthResult<Identity> {
        let target = within(
            self.engine.config.store_timeout,
            IdentityRepository::find_by_id(self.engine.store.as_ref(), target_id),
        )
        .await?
        .ok_or(AuthError::IdentityNotFound)?;

        self.engine
            .permissions
            .ensure_can_manage(&actor.role, &target.role)
            .await?;
        Ok(target)
    }
}
