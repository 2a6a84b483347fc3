//! One-Time Code Challenges
//!
//! Issues and verifies the second factor. At most one redeemable challenge
//! exists per (identity, purpose): issuing supersedes earlier ones in the
//! same store transaction.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use kernel::id::{ChallengeId, IdentityId};
use platform::client::ClientContext;
use zeroize::Zeroizing;

use crate::application::config::{AuthConfig, chrono_duration};
use crate::application::timeout::within;
use crate::domain::entity::otp_challenge::OtpChallenge;
use crate::domain::repository::OtpChallengeRepository;
use crate::domain::services::{generate_otp_code, hash_otp_code, otp_hashes_match};
use crate::domain::value_object::otp_purpose::OtpPurpose;
use crate::error::{AuthError, AuthResult};

/// Longest candidate accepted for hashing
const MAX_CANDIDATE_LEN: usize = 32;

/// Freshly issued challenge
///
/// `code` is the only copy of the plaintext; it is wiped on drop.
pub struct IssuedChallenge {
    pub challenge_id: ChallengeId,
    pub identity_id: IdentityId,
    pub purpose: OtpPurpose,
    pub code: Zeroizing<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedChallenge")
            .field("challenge_id", &self.challenge_id)
            .field("identity_id", &self.identity_id)
            .field("purpose", &self.purpose)
            .field("code", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// OTP challenge service
pub struct OtpChallengeService<O>
where
    O: OtpChallengeRepository,
{
    challenges: Arc<O>,
    config: Arc<AuthConfig>,
}

impl<O> OtpChallengeService<O>
where
    O: OtpChallengeRepository,
{
    pub fn new(challenges: Arc<O>, config: Arc<AuthConfig>) -> Self {
        Self { challenges, config }
    }

    /// Issue a new challenge, superseding any still-valid one for the pair
    pub async fn issue(
        &self,
        identity_id: &IdentityId,
        purpose: OtpPurpose,
        client: &ClientContext,
    ) -> AuthResult<IssuedChallenge> {
        let code = Zeroizing::new(generate_otp_code(self.config.otp_length));
        let code_hash = hash_otp_code(&self.config.otp_hash_key, identity_id, purpose, &code)?;

        let challenge = OtpChallenge::new(
            *identity_id,
            purpose,
            code_hash,
            chrono_duration(self.config.otp_ttl),
            self.config.otp_max_attempts,
            client.ip_string(),
            client.user_agent.clone(),
        );

        let superseded = within(
            self.config.store_timeout,
            self.challenges.replace_active(&challenge),
        )
        .await?;

        tracing::info!(
            identity_id = %identity_id,
            challenge_id = %challenge.id,
            purpose = %purpose,
            superseded,
            "Verification code issued"
        );

        Ok(IssuedChallenge {
            challenge_id: challenge.id,
            identity_id: *identity_id,
            purpose,
            code,
            expires_at: challenge.expires_at,
        })
    }

    /// Verify `candidate` against the latest challenge for the pair
    ///
    /// Used, expired and exhausted challenges are rejected before the code
    /// is looked at. A match redeems the challenge exactly once.
    pub async fn verify(
        &self,
        identity_id: &IdentityId,
        purpose: OtpPurpose,
        candidate: &str,
    ) -> AuthResult<()> {
        let candidate = candidate.trim();
        if candidate.is_empty() || candidate.len() > MAX_CANDIDATE_LEN {
            return Err(AuthError::ValidationFailed(
                "verification code is required".to_string(),
            ));
        }

        let budget = self.config.store_timeout;
        let now = Utc::now();

        let challenge = within(
            budget,
            self.challenges.find_latest_unused(identity_id, purpose),
        )
        .await?
        .ok_or(AuthError::NoValidChallenge)?;

        challenge.ensure_verifiable_at(now)?;

        if let Some(bypass) = self.config.active_bypass_code() {
            if candidate == bypass {
                tracing::warn!(
                    identity_id = %identity_id,
                    challenge_id = %challenge.id,
                    environment = self.config.environment.code(),
                    "Verification bypass code accepted"
                );
                return self.redeem(&challenge, now).await;
            }
        }

        let candidate_hash =
            hash_otp_code(&self.config.otp_hash_key, identity_id, purpose, candidate)?;
        if otp_hashes_match(&challenge.code_hash, &candidate_hash) {
            return self.redeem(&challenge, now).await;
        }

        let attempts = within(budget, self.challenges.record_mismatch(&challenge.id, now))
            .await?
            .ok_or(AuthError::AttemptsExceeded)?;
        let attempts_remaining = challenge.max_attempts.saturating_sub(attempts);

        tracing::warn!(
            identity_id = %identity_id,
            challenge_id = %challenge.id,
            attempts,
            attempts_remaining,
            "Verification code mismatch"
        );
        Err(AuthError::ChallengeMismatch { attempts_remaining })
    }

    /// Latest unused challenge for the pair, redeemable or not
    pub async fn pending(
        &self,
        identity_id: &IdentityId,
        purpose: OtpPurpose,
    ) -> AuthResult<Option<OtpChallenge>> {
        within(
            self.config.store_timeout,
            self.challenges.find_latest_unused(identity_id, purpose),
        )
        .await
    }

    async fn redeem(&self, challenge: &OtpChallenge, now: DateTime<Utc>) -> AuthResult<()> {
        let redeemed = within(
            self.config.store_timeout,
            self.challenges.redeem(&challenge.id, now),
        )
        .await?;

        if !redeemed {
            // Lost a race with another redemption, a mismatch or expiry
            return Err(AuthError::NoValidChallenge);
        }

        tracing::info!(
            identity_id = %challenge.identity_id,
            challenge_id = %challenge.id,
            purpose = %challenge.purpose,
            "Verification code redeemed"
        );
        Ok(())
    }
}
