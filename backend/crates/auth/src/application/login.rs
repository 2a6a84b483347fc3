//! Login Flow
//!
//! Password first, then a one-time code, then a session:
//!
//! 1. `begin`: rate limit, look up, verify password, issue and deliver a code
//! 2. `complete`: rate limit, verify the code, create the session
//!
//! `resend` supersedes the pending code of a login in progress.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use kernel::id::IdentityId;
use platform::client::ClientContext;
use platform::password::ClearTextPassword;
use platform::rate_limit::RateLimitStore;

use crate::application::engine::AuthEngine;
use crate::application::rate_limiter::LimitedEndpoint;
use crate::application::session_manager::SessionTokens;
use crate::application::timeout::within;
use crate::domain::entity::identity::Identity;
use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::domain::value_object::{email::Email, otp_purpose::OtpPurpose};
use crate::error::{AuthError, AuthResult};

/// A login waiting for its second factor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChallenge {
    pub identity_id: IdentityId,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
}

/// Login flow use case
pub struct LoginFlow<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    engine: Arc<AuthEngine<R, L>>,
}

impl<R, L> LoginFlow<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(engine: Arc<AuthEngine<R, L>>) -> Self {
        Self { engine }
    }

    /// Step one: check the password and send a code
    pub async fn begin(
        &self,
        email: &str,
        password: String,
        client: &ClientContext,
    ) -> AuthResult<PendingChallenge> {
        let email = Email::new(email)?;
        let engine = &self.engine;

        engine
            .limiter
            .check(
                LimitedEndpoint::Login,
                &LimitedEndpoint::Login.key(&client.ip_key(), email.as_str()),
            )
            .await?;

        let identity = within(
            engine.config.store_timeout,
            engine.store.find_by_email(&email),
        )
        .await?;
        let Some(identity) = identity else {
            tracing::debug!(ip = %client.ip_key(), "Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let candidate = ClearTextPassword::candidate(password);
        engine.credentials.verify(&identity, &candidate).await?;

        self.send_code(&identity, client).await
    }

    /// Step two: redeem the code and open a session
    pub async fn complete(
        &self,
        identity_id: &IdentityId,
        code: &str,
        client: &ClientContext,
        device_info: Option<String>,
    ) -> AuthResult<SessionTokens> {
        let engine = &self.engine;

        engine
            .limiter
            .check(
                LimitedEndpoint::OtpVerify,
                &LimitedEndpoint::OtpVerify.key(&client.ip_key(), &identity_id.to_string()),
            )
            .await?;

        engine
            .challenges
            .verify(identity_id, OtpPurpose::Login, code)
            .await?;

        // Status or lock may have changed since step one
        let identity = self
            .load_identity(identity_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        ensure_may_login(&identity)?;

        let tokens = engine.sessions.create(&identity, client, device_info).await?;
        tracing::info!(
            identity_id = %identity.id,
            session_id = %tokens.session_id,
            "Login completed"
        );
        Ok(tokens)
    }

    /// Issue a fresh code for a login in progress
    pub async fn resend(
        &self,
        identity_id: &IdentityId,
        client: &ClientContext,
    ) -> AuthResult<PendingChallenge> {
        let engine = &self.engine;

        engine
            .limiter
            .check(
                LimitedEndpoint::OtpResend,
                &LimitedEndpoint::OtpResend.key(&client.ip_key(), &identity_id.to_string()),
            )
            .await?;

        // Only a login that already passed the password step can resend
        if engine
            .challenges
            .pending(identity_id, OtpPurpose::Login)
            .await?
            .is_none()
        {
            return Err(AuthError::NoValidChallenge);
        }

        let identity = self
            .load_identity(identity_id)
            .await?
            .ok_or(AuthError::NoValidChallenge)?;
        ensure_may_login(&identity)?;

        self.send_code(&identity, client).await
    }

    async fn send_code(
        &self,
        identity: &Identity,
        client: &ClientContext,
    ) -> AuthResult<PendingChallenge> {
        let issued = self
            .engine
            .challenges
            .issue(&identity.id, OtpPurpose::Login, client)
            .await?;
        self.engine.delivery.deliver(&identity.email, &issued)?;

        Ok(PendingChallenge {
            identity_id: identity.id,
            purpose: issued.purpose,
            expires_at: issued.expires_at,
        })
    }

    async fn load_identity(&self, id: &IdentityId) -> AuthResult<Option<Identity>> {
        within(
            self.engine.config.store_timeout,
            IdentityRepository::find_by_id(self.engine.store.as_ref(), id),
        )
        .await
    }
}

fn ensure_may_login(identity: &Identity) -> AuthResult<()> {
    if !identity.is_active() {
        return Err(AuthError::AccountInactive);
    }
    if let Some(locked_until) = identity
        .attempts
        .locked_until
        .filter(|_| identity.is_locked_at(Utc::now()))
    {
        return Err(AuthError::AccountLocked { locked_until });
    }
    Ok(())
}
