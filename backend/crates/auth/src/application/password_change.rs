//! Password Change Use Case
//!
//! Re-verifies the current password, stores the new hash and ends every
//! other session of the identity.

use chrono::Utc;
use std::sync::Arc;

use kernel::id::{IdentityId, SessionId};
use platform::password::ClearTextPassword;
use platform::rate_limit::RateLimitStore;

use crate::application::engine::AuthEngine;
use crate::application::timeout::within;
use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::domain::value_object::termination_reason::TerminationReason;
use crate::error::{AuthError, AuthResult};

/// Password change input
pub struct PasswordChangeInput {
    pub identity_id: IdentityId,
    /// Session the request was made from; it stays active
    pub session_id: SessionId,
    pub current_password: String,
    pub new_password: String,
}

/// Password change use case
pub struct PasswordChange<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    engine: Arc<AuthEngine<R, L>>,
}

impl<R, L> PasswordChange<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(engine: Arc<AuthEngine<R, L>>) -> Self {
        Self { engine }
    }

    /// Returns how many other sessions were terminated
    pub async fn execute(&self, input: PasswordChangeInput) -> AuthResult<u64> {
        let engine = &self.engine;
        let budget = engine.config.store_timeout;

        if input.current_password == input.new_password {
            return Err(AuthError::ValidationFailed(
                "new password must differ from the current one".to_string(),
            ));
        }

        let identity = within(
            budget,
            IdentityRepository::find_by_id(engine.store.as_ref(), &input.identity_id),
        )
        .await?
        .ok_or(AuthError::IdentityNotFound)?;

        // Policy first: a weak new password must not cost a login attempt
        let new_password = ClearTextPassword::new(input.new_password)?;

        engine
            .credentials
            .verify(&identity, &ClearTextPassword::candidate(input.current_password))
            .await?;

        let hash = new_password.hash(engine.config.pepper())?;
        let updated = within(
            budget,
            engine.store.update_password(&identity.id, &hash, Utc::now()),
        )
        .await?;
        if !updated {
            return Err(AuthError::IdentityNotFound);
        }

        let terminated = engine
            .sessions
            .terminate_all(
                &identity.id,
                TerminationReason::PasswordChange,
                Some(&identity.id),
                Some(&input.session_id),
            )
            .await?;

        tracing::info!(
            identity_id = %identity.id,
            sessions_terminated = terminated,
            "Password changed"
        );
        Ok(terminated)
    }
}
