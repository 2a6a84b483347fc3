//! Credential Verifier
//!
//! Checks a password against an identity's stored hash and enforces the
//! timed lockout. Counter and lock changes are persisted before the
//! result is returned.

use chrono::Utc;
use std::sync::Arc;

use platform::password::ClearTextPassword;

use crate::application::config::AuthConfig;
use crate::application::timeout::within;
use crate::domain::entity::identity::Identity;
use crate::domain::repository::IdentityRepository;
use crate::error::{AuthError, AuthResult};

/// Credential verifier
pub struct CredentialVerifier<I>
where
    I: IdentityRepository,
{
    identities: Arc<I>,
    config: Arc<AuthConfig>,
}

impl<I> CredentialVerifier<I>
where
    I: IdentityRepository,
{
    pub fn new(identities: Arc<I>, config: Arc<AuthConfig>) -> Self {
        Self { identities, config }
    }

    /// Verify `candidate` for `identity`
    ///
    /// Inactive and locked identities are rejected without consuming an
    /// attempt and without evaluating the password.
    pub async fn verify(
        &self,
        identity: &Identity,
        candidate: &ClearTextPassword,
    ) -> AuthResult<()> {
        let now = Utc::now();

        if !identity.is_active() {
            return Err(AuthError::AccountInactive);
        }
        if let Some(locked_until) = identity
            .attempts
            .locked_until
            .filter(|_| identity.is_locked_at(now))
        {
            return Err(AuthError::AccountLocked { locked_until });
        }

        let budget = self.config.store_timeout;

        if identity.password_hash.verify(candidate, self.config.pepper()) {
            within(budget, self.identities.record_login_success(&identity.id, now)).await?;
            tracing::debug!(identity_id = %identity.id, "Password verified");
            return Ok(());
        }

        let policy = self.config.lockout_policy();
        let attempts = within(
            budget,
            self.identities.record_login_failure(&identity.id, now, &policy),
        )
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        match attempts.locked_until.filter(|_| attempts.is_locked_at(now)) {
            Some(locked_until) => {
                tracing::warn!(
                    identity_id = %identity.id,
                    failed = attempts.failed,
                    %locked_until,
                    "Account locked after repeated failures"
                );
                Err(AuthError::AccountLocked { locked_until })
            }
            None => {
                tracing::warn!(
                    identity_id = %identity.id,
                    failed = attempts.failed,
                    "Password mismatch"
                );
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::{
        email::Email, identity_status::IdentityStatus, login_attempts::LoginAttempts,
        role_name::RoleName,
    };
    use crate::infra::memory::MemoryAuthRepository;
    use chrono::Duration;

    const PASSWORD: &str = "correct horse battery";

    async fn setup() -> (
        CredentialVerifier<MemoryAuthRepository>,
        Arc<MemoryAuthRepository>,
        Identity,
    ) {
        let repo = Arc::new(MemoryAuthRepository::new());
        let hash = ClearTextPassword::new(PASSWORD.to_string())
            .unwrap()
            .hash(None)
            .unwrap();
        let identity = Identity::new(
            Email::new("grace@example.com").unwrap(),
            hash,
            RoleName::from_db("employee"),
        );
        repo.create(&identity).await.unwrap();

        let verifier =
            CredentialVerifier::new(repo.clone(), Arc::new(AuthConfig::with_random_secrets()));
        (verifier, repo, identity)
    }

    async fn reload(repo: &MemoryAuthRepository, identity: &Identity) -> Identity {
        repo.find_by_id(&identity.id).await.unwrap().unwrap()
    }

    fn wrong() -> ClearTextPassword {
        ClearTextPassword::candidate("wrong password!".to_string())
    }

    #[tokio::test]
    async fn test_success_clears_counter() {
        let (verifier, repo, identity) = setup().await;
        let _ = verifier.verify(&identity, &wrong()).await;
        assert_eq!(reload(&repo, &identity).await.attempts.failed, 1);

        let current = reload(&repo, &identity).await;
        verifier
            .verify(&current, &ClearTextPassword::candidate(PASSWORD.to_string()))
            .await
            .unwrap();
        let after = reload(&repo, &identity).await;
        assert_eq!(after.attempts, LoginAttempts::cleared());
        assert!(after.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_fifth_failure_locks() {
        let (verifier, repo, identity) = setup().await;
        for _ in 0..4 {
            let current = reload(&repo, &identity).await;
            assert!(matches!(
                verifier.verify(&current, &wrong()).await,
                Err(AuthError::InvalidCredentials)
            ));
        }

        let current = reload(&repo, &identity).await;
        assert!(matches!(
            verifier.verify(&current, &wrong()).await,
            Err(AuthError::AccountLocked { .. })
        ));

        // Correct password is not even evaluated while locked
        let locked = reload(&repo, &identity).await;
        assert!(matches!(
            verifier
                .verify(&locked, &ClearTextPassword::candidate(PASSWORD.to_string()))
                .await,
            Err(AuthError::AccountLocked { .. })
        ));
        assert_eq!(reload(&repo, &identity).await.attempts.failed, 5);
    }

    #[tokio::test]
    async fn test_expired_lock_allows_login() {
        let (verifier, repo, identity) = setup().await;
        repo.with_identity(&identity.id, |i| {
            i.attempts = LoginAttempts {
                failed: 5,
                locked_until: Some(Utc::now() - Duration::seconds(1)),
            };
        });

        let current = reload(&repo, &identity).await;
        verifier
            .verify(&current, &ClearTextPassword::candidate(PASSWORD.to_string()))
            .await
            .unwrap();
        assert_eq!(reload(&repo, &identity).await.attempts.failed, 0);
    }

    #[tokio::test]
    async fn test_inactive_rejected_without_attempt() {
        let (verifier, repo, identity) = setup().await;
        repo.with_identity(&identity.id, |i| i.status = IdentityStatus::Suspended);

        let current = reload(&repo, &identity).await;
        assert!(matches!(
            verifier.verify(&current, &wrong()).await,
            Err(AuthError::AccountInactive)
        ));
        assert_eq!(reload(&repo, &identity).await.attempts.failed, 0);
    }
}
